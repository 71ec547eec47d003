//! PaxosLease: a leader-lease sub-protocol layered over Paxos so a
//! shard quorum's primary can serve reads without running a
//! full round per request. A lease is only ever granted through a
//! chosen Paxos value (`crate::quorum::Context` proposes
//! `RequestLease`/`ReceiveLease` cluster messages the same way it
//! proposes ordinary commands), so this type only holds the resulting
//! state and its validity check.

use crate::ids::NodeId;

/// A grant of primary-ship to `holder` until `expire_at_ms`, per
/// `general.paxos_lease_time_ms` (`sdb_config::General`, capped at
/// `PAXOSLEASE_MAX_LEASE_TIME_MS`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaxosLease {
    pub holder: Option<NodeId>,
    pub expire_at_ms: u64,
}

impl PaxosLease {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn grant(node_id: NodeId, now_ms: u64, lease_time_ms: u64) -> Self {
        Self {
            holder: Some(node_id),
            expire_at_ms: now_ms + lease_time_ms,
        }
    }

    /// True iff `node_id` currently holds an unexpired lease. A shard
    /// quorum only serves primary-only reads while this holds.
    pub fn is_valid_for(&self, node_id: NodeId, now_ms: u64) -> bool {
        self.holder == Some(node_id) && now_ms < self.expire_at_ms
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.holder.is_none() || now_ms >= self.expire_at_ms
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fresh_lease_is_valid_for_holder_only() {
        let lease = PaxosLease::grant(NodeId(1), 1_000, 7_000);
        assert!(lease.is_valid_for(NodeId(1), 2_000));
        assert!(!lease.is_valid_for(NodeId(2), 2_000));
    }

    #[test]
    fn test_lease_expires_after_lease_time() {
        let lease = PaxosLease::grant(NodeId(1), 1_000, 7_000);
        assert!(!lease.is_valid_for(NodeId(1), 8_000));
        assert!(lease.is_expired(8_000));
    }

    #[test]
    fn test_no_lease_is_expired() {
        assert!(PaxosLease::none().is_expired(0));
    }
}
