//! The Quorum Context: binds one replicated log to a transport, a
//! durable acceptor store, and a consumer that applies chosen values in
//! order. Shard quorums (`crate::shard`) and the controller quorum
//! (`crate::configplane`) are both just a [`Context`] parameterized
//! over a different [`LogConsumer`].

pub mod context;
pub mod error;
pub mod transport;

pub use context::{Context, ContextStatsSnapshot, LogConsumer};
pub use error::Error;
pub use transport::ClusterTransport;
