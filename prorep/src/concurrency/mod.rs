//! Coordination primitives shared by the poll loop and its callers.

pub mod shutdown;
