//! Schema map derived from the upstream DDL artifact.
//!
//! The map translates source table and column names into target names and types. It is loaded
//! once at startup and shared read-only by every worker.

mod column;
mod ddl;
mod map;

pub use column::*;
pub use ddl::*;
pub use map::*;
