//! The durable change queue: listing, claiming, decoding and removing queue entries.

mod base;
pub mod decode;
pub mod fs;
pub mod lock;

pub use base::ChangeQueue;
pub use fs::FsQueue;
pub use lock::ClaimInfo;
