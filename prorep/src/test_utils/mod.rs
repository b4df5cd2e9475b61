//! Testing utilities for the change-apply engine.
//!
//! Provides a canned schema map, helpers that publish entries into a queue directory the way the
//! producer does, and a [`faulty::FaultyDestination`] wrapper that injects statement failures
//! into any destination. [`failpoints::FailpointScenario`] scopes `fail` configuration to a test.

pub mod entries;
pub mod failpoints;
pub mod faulty;
pub mod schema;
