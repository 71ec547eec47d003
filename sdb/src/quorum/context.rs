//! `Context`: one replicated log, driven by Paxos, applied in order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::ids::{NodeId, ProposalId, QuorumId};
use crate::paxos::{AcceptorState, AcceptorStore, PaxosInstance, PaxosLease, PaxosMessage, PaxosTransport};

use super::error::Error;

/// Applies a chosen value at a given log position. `crate::shard`
/// implements this over key/value commands; `crate::configplane`
/// implements it over [`crate::configplane::ConfigCommand`].
#[async_trait::async_trait]
pub trait LogConsumer: Send + Sync {
    async fn apply(&self, log_position: u64, value: Bytes) -> Result<(), Error>;
}

/// Plain atomic counters, snapshotted via [`Context::stats`].
#[derive(Default)]
struct ContextStats {
    proposals: AtomicU64,
    learns: AtomicU64,
    catchups_served: AtomicU64,
}

/// A point-in-time snapshot of a [`Context`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStatsSnapshot {
    pub proposals: u64,
    pub learns: u64,
    pub catchups_served: u64,
}

/// One quorum's view of its own replicated log: which position comes
/// next, the durable acceptor state backing it, and the lease that
/// lets this node skip Paxos rounds for reads while it holds
/// primary-ship.
pub struct Context<S, T, C> {
    quorum_id: QuorumId,
    node_id: NodeId,
    peers: Vec<NodeId>,
    acceptor_store: Arc<S>,
    transport: Arc<T>,
    consumer: Arc<C>,
    paxos: PaxosInstance,
    next_log_position: AtomicU64,
    lease: Mutex<PaxosLease>,
    /// Chosen values not yet handed to the consumer, keyed by log
    /// position — populated by [`Context::catchup`] when entries arrive
    /// out of order.
    pending: Mutex<BTreeMap<u64, Bytes>>,
    stats: ContextStats,
}

impl<S, T, C> Context<S, T, C>
where
    S: AcceptorStore,
    T: PaxosTransport,
    C: LogConsumer,
{
    pub fn new(
        quorum_id: QuorumId,
        node_id: NodeId,
        peers: Vec<NodeId>,
        acceptor_store: Arc<S>,
        transport: Arc<T>,
        consumer: Arc<C>,
    ) -> Self {
        Self {
            quorum_id,
            node_id,
            peers,
            acceptor_store,
            transport,
            consumer,
            paxos: PaxosInstance::new(node_id),
            next_log_position: AtomicU64::new(0),
            lease: Mutex::new(PaxosLease::none()),
            pending: Mutex::new(BTreeMap::new()),
            stats: ContextStats::default(),
        }
    }

    pub fn quorum_id(&self) -> QuorumId {
        self.quorum_id
    }

    pub fn stats(&self) -> ContextStatsSnapshot {
        ContextStatsSnapshot {
            proposals: self.stats.proposals.load(Ordering::Relaxed),
            learns: self.stats.learns.load(Ordering::Relaxed),
            catchups_served: self.stats.catchups_served.load(Ordering::Relaxed),
        }
    }

    pub fn last_chosen_log_position(&self) -> u64 {
        self.next_log_position.load(Ordering::SeqCst)
    }

    pub fn lease(&self) -> PaxosLease {
        *self.lease.lock()
    }

    pub fn set_lease(&self, lease: PaxosLease) {
        *self.lease.lock() = lease;
    }

    /// True while this node may serve reads without a Paxos round:
    /// primary-only reads under an unexpired lease.
    pub fn is_safe_to_read(&self, now_ms: u64) -> bool {
        self.lease.lock().is_valid_for(self.node_id, now_ms)
    }

    /// Drive one value through Paxos at the next log position, persist
    /// the result, and hand it to the consumer in order.
    pub async fn propose(&self, value: Bytes) -> Result<u64, Error> {
        self.stats.proposals.fetch_add(1, Ordering::Relaxed);
        let log_position = self.next_log_position.load(Ordering::SeqCst);

        let chosen = self
            .paxos
            .propose(self.transport.as_ref(), &self.peers, value)
            .await?;

        self.acceptor_store
            .save(
                log_position,
                &AcceptorState {
                    promised_proposal_id: None,
                    accepted_proposal_id: Some(ProposalId(log_position)),
                    accepted_value: Some(chosen.clone()),
                },
            )
            .await?;

        self.apply_in_order(log_position, chosen).await?;
        Ok(log_position)
    }

    /// Feed a value learned out-of-band (a `LearnChosen` cluster
    /// message, or catchup replay) into this quorum's log, applying
    /// whatever contiguous run of positions that unblocks.
    pub async fn learn(&self, log_position: u64, value: Bytes) -> Result<(), Error> {
        let expected = self.next_log_position.load(Ordering::SeqCst);
        if log_position < expected {
            return Err(Error::AlreadyApplied(log_position));
        }
        self.stats.learns.fetch_add(1, Ordering::Relaxed);
        self.apply_in_order(log_position, value).await
    }

    async fn apply_in_order(&self, log_position: u64, value: Bytes) -> Result<(), Error> {
        {
            let mut pending = self.pending.lock();
            pending.insert(log_position, value);
        }

        loop {
            let expected = self.next_log_position.load(Ordering::SeqCst);
            let next_value = self.pending.lock().remove(&expected);
            let Some(next_value) = next_value else {
                break;
            };

            self.consumer
                .apply(expected, next_value)
                .await
                .map_err(|e| Error::Consumer(expected, e.to_string()))?;
            self.next_log_position.store(expected + 1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Replay every chosen entry from `from_position` onward to a peer
    /// that has fallen behind, driven by the caller's transport rather
    /// than this quorum's own — a lagging peer is not yet a voting
    /// participant in new rounds.
    pub async fn catchup(&self, peer: NodeId, from_position: u64) -> Result<u64, Error> {
        let mut sent = 0u64;
        for position in from_position..self.last_chosen_log_position() {
            let state = self.acceptor_store.load(position).await?;
            let Some(value) = state.accepted_value else {
                return Err(Error::NotChosen(position));
            };
            self.transport
                .send(
                    peer,
                    PaxosMessage::LearnChosen {
                        proposal_id: ProposalId(position),
                        value,
                    },
                )
                .await?;
            sent += 1;
        }
        self.stats.catchups_served.fetch_add(1, Ordering::Relaxed);
        Ok(sent)
    }
}
