//! Logging and metrics setup shared by prorep binaries and tests.

pub mod metrics;
pub mod tracing;
