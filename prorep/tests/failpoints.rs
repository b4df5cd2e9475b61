use std::path::Path;
use std::sync::Arc;

use prorep::destination::memory::MemoryDestination;
use prorep::error::ErrorKind;
use prorep::failpoints::{APPLY_ENTRY__AFTER_CLAIM, APPLY_ROW__BEFORE_WRITE, POLL_CYCLE__AFTER_LIST};
use prorep::pipeline::PollLoop;
use prorep::queue::FsQueue;
use prorep::queue::lock::lock_path;
use prorep::test_utils::entries::write_entry;
use prorep::test_utils::failpoints::FailpointScenario;
use prorep::test_utils::schema::customer_schema;
use prorep::types::RecId;
use prorep_config::shared::EngineConfig;
use prorep_telemetry::tracing::init_test_tracing;
use serde_json::json;

fn create_poll_loop(
    dir: &Path,
    destination: MemoryDestination,
    configure: impl FnOnce(&mut EngineConfig),
) -> PollLoop<FsQueue, MemoryDestination> {
    let mut config = EngineConfig::new(dir);
    config.delay_secs = 0;
    config.one_pass = true;
    configure(&mut config);

    PollLoop::new(
        FsQueue::new(dir, "*.json").unwrap(),
        destination,
        Arc::new(customer_schema()),
        Arc::new(config),
    )
}

fn write_customer_entry(dir: &Path) -> std::path::PathBuf {
    write_entry(
        dir,
        "t__customer__e__1__insert.json",
        &[
            json!({"rec_id": 1, "epoch_time": 1, "name": "first"}),
            json!({"rec_id": 2, "epoch_time": 1, "name": "second"}),
        ],
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_write_failure_is_retried_after_reconnect() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(APPLY_ROW__BEFORE_WRITE, "1*return(transient)")]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_customer_entry(dir.path());
    let destination = MemoryDestination::new();
    let mut poll_loop = create_poll_loop(dir.path(), destination.clone(), |_| {});

    let cycle = poll_loop.run_cycle().await.unwrap();

    assert_eq!(cycle.counts.inserts, 2);
    assert_eq!(destination.connections().await, 2);
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_transient_write_failure_stops_the_cycle() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(APPLY_ROW__BEFORE_WRITE, "2*return(transient)")]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_customer_entry(dir.path());
    let destination = MemoryDestination::new();
    let mut poll_loop = create_poll_loop(dir.path(), destination.clone(), |_| {});

    let err = poll_loop.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationConnectionFailed);
    assert!(path.exists());
    assert!(!lock_path(&path).exists());
    assert!(destination.rows("customer").await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_write_failure_preserves_the_entry() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(APPLY_ROW__BEFORE_WRITE, "return")]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_customer_entry(dir.path());
    let destination = MemoryDestination::new();
    let mut poll_loop = create_poll_loop(dir.path(), destination.clone(), |_| {});

    let err = poll_loop.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    assert_eq!(destination.connections().await, 1);
    assert!(path.exists());
    assert!(!lock_path(&path).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn fast_insert_does_not_retry_with_pending_writes() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(
        APPLY_ROW__BEFORE_WRITE,
        "1*off->1*return(transient)",
    )]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_customer_entry(dir.path());
    let destination = MemoryDestination::new();
    let mut poll_loop = create_poll_loop(dir.path(), destination.clone(), |config| {
        config.fast_insert = true;
    });

    let err = poll_loop.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationConnectionFailed);
    assert_eq!(destination.connections().await, 1);
    assert_eq!(destination.commits().await, 0);
    assert!(path.exists());
    assert!(!lock_path(&path).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_claim_releases_the_lock() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(APPLY_ENTRY__AFTER_CLAIM, "return")]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_customer_entry(dir.path());
    let destination = MemoryDestination::new();
    let mut poll_loop = create_poll_loop(dir.path(), destination.clone(), |_| {});

    let err = poll_loop.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    assert!(path.exists());
    assert!(!lock_path(&path).exists());
    assert_eq!(destination.connections().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_listing_touches_nothing() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(POLL_CYCLE__AFTER_LIST, "return(conversion)")]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_customer_entry(dir.path());
    let destination = MemoryDestination::new();
    let mut poll_loop = create_poll_loop(dir.path(), destination.clone(), |_| {});

    let err = poll_loop.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConversionError);
    assert!(path.exists());
    assert!(!lock_path(&path).exists());
    assert!(destination.row("customer", RecId(1)).await.is_none());
}
