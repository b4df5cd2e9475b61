//! Worker pool plumbing and the two dispatch strategies.

pub mod entry;
pub mod pool;
pub mod scheduler;
