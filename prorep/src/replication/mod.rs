//! Conflict resolution and application of change rows against the target store.

pub mod apply;
pub mod resilience;
