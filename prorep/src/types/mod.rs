//! Common types used throughout the change-apply engine.
//!
//! Covers queue entries and their decoded metadata, the change rows carried in entry payloads,
//! typed cell values bound to the target store, and per-unit outcome records.

mod cell;
mod entry;
mod outcome;
mod row;
mod target_row;

pub use cell::*;
pub use entry::*;
pub use outcome::*;
pub use row::*;
pub use target_row::*;
