//! The Paxos core: single-decree Paxos over one replicated log position
//! at a time, plus the PaxosLease sub-protocol shard quorums use to
//! elect and renew a primary without running a Paxos round for every
//! read.
//!
//! This module is transport- and storage-agnostic: `crate::quorum`
//! wires a [`PaxosInstance`] to the cluster protocol
//! (`crate::net::cluster`) and to acceptor persistence
//! (`crate::storage`) via the [`AcceptorStore`] trait.

pub mod acceptor;
pub mod error;
pub mod lease;
pub mod message;
pub mod proposer;

pub use acceptor::{AcceptorState, AcceptorStore};
pub use error::Error;
pub use lease::PaxosLease;
pub use message::PaxosMessage;
pub use proposer::{PaxosInstance, PaxosTransport};
