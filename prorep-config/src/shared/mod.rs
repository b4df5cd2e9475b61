//! Shared configuration types for prorep services.

mod base;
mod connection;
mod engine;

pub use base::ValidationError;
pub use connection::{APPLY_SESSION_OPTIONS, SessionOptions, TargetConnectionConfig};
pub use engine::{ConcurrencyStrategy, EngineConfig};
