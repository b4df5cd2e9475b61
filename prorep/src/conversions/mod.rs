//! Conversions from JSON payload values into typed [`crate::types::Cell`] values.

pub mod bool;
pub mod temporal;
pub mod value;

pub use value::{EXTENT_SEPARATOR, flatten_extent, json_to_cell};
