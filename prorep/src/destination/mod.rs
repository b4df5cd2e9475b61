//! Target stores that change rows are applied to.

mod base;
pub mod memory;
pub mod postgres;

pub use base::{Destination, DestinationSession, InsertMode};
