//! The Shard Quorum Processor: applies commands learned by a quorum's
//! [`crate::quorum::Context`] to the local [`crate::storage::Environment`],
//! and serves reads directly (gated by the quorum's lease, not by this
//! module).

pub mod command;
pub mod error;
pub mod processor;

pub use command::ShardCommand;
pub use error::Error;
pub use processor::ShardQuorumProcessor;
