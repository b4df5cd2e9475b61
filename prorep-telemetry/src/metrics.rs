use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Installs the Prometheus recorder with an HTTP listener on `[::]:{port}/metrics`.
///
/// Must be called from within a Tokio runtime because the exporter spawns its listener task on
/// the current runtime.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        .install()
}
