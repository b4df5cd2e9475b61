//! Change-apply engine replicating 4GL database changes into PostgreSQL.
//!
//! A producer publishes change entries as JSON files into a queue directory. The engine claims
//! each entry with a lock marker, decodes its name and payload, resolves source names through
//! the [`schema::SchemaMap`] and applies every row to a [`destination::Destination`] using
//! epoch-based conflict resolution. The [`pipeline::PollLoop`] drives the whole process.

pub mod concurrency;
pub mod conversions;
pub mod destination;
pub mod error;
pub mod failpoints;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod replication;
pub mod schema;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
