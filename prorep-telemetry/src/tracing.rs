use std::sync::Once;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Default filter used in debug mode when `RUST_LOG` is not set.
const DEBUG_FILTER: &str = "debug";

/// Filter used by tests when `RUST_LOG` is not set.
const TEST_FILTER: &str = "warn";

static TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global tracing subscriber for a service.
///
/// `RUST_LOG` takes precedence. Without it the filter is `info`, or `debug` when `debug` is set.
/// The service name is logged once, on the event announcing that tracing is ready.
pub fn init_tracing(service_name: &'static str, debug: bool) -> Result<(), TracingError> {
    let default_filter = if debug { DEBUG_FILTER } else { DEFAULT_FILTER };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(debug))
        .try_init()?;

    ::tracing::info!(service = service_name, "tracing initialized");

    Ok(())
}

/// Installs a test subscriber once per process.
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TEST_FILTER));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
