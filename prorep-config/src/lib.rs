//! Shared configuration for the prorep change-apply engine.
//!
//! Two kinds of configuration live here: [`shared::EngineConfig`], which is assembled once from
//! the command line and never mutated afterwards, and [`shared::TargetConnectionConfig`], which
//! comes from the `config` block of the upstream DDL artifact and can be overridden through
//! `APP_`-prefixed environment variables (see [`load_target_config`]).

mod load;
pub mod shared;

pub use load::{LoadConfigError, decode_artifact, load_target_config};
