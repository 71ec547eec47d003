//! Shard server liveness tracking on the controller. Shard servers send
//! `HEARTBEAT` cluster messages on `general.heartbeat_interval_ms`; the
//! controller marks a node inactive once its lease has not been renewed
//! within `general.heartbeat_timeout_ms` and proposes a
//! `DeactivateNode` command.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::ids::NodeId;

/// A single node's last-known liveness record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub node_id: NodeId,
    pub last_seen_ms: u64,
    pub expire_at_ms: u64,
}

/// Tracks heartbeats for every shard server the controller currently
/// knows about. `now_ms` is threaded in by the caller rather than read
/// from the clock here, keeping this deterministic to test.
#[derive(Debug, Default)]
pub struct ConfigHeartbeatManager {
    heartbeats: Mutex<HashMap<NodeId, Heartbeat>>,
}

impl ConfigHeartbeatManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node_id: NodeId, now_ms: u64, timeout_ms: u64) {
        self.heartbeats.lock().insert(
            node_id,
            Heartbeat {
                node_id,
                last_seen_ms: now_ms,
                expire_at_ms: now_ms + timeout_ms,
            },
        );
    }

    pub fn is_alive(&self, node_id: NodeId, now_ms: u64) -> bool {
        self.heartbeats
            .lock()
            .get(&node_id)
            .is_some_and(|hb| hb.expire_at_ms > now_ms)
    }

    /// Nodes whose lease has lapsed as of `now_ms`, the set the
    /// controller should propose `DeactivateNode` for.
    pub fn expired(&self, now_ms: u64) -> Vec<NodeId> {
        self.heartbeats
            .lock()
            .values()
            .filter(|hb| hb.expire_at_ms <= now_ms)
            .map(|hb| hb.node_id)
            .collect()
    }

    pub fn forget(&self, node_id: NodeId) {
        self.heartbeats.lock().remove(&node_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fresh_heartbeat_is_alive() {
        let manager = ConfigHeartbeatManager::new();
        manager.record(NodeId(1), 1_000, 21_000);
        assert!(manager.is_alive(NodeId(1), 5_000));
        assert!(manager.expired(5_000).is_empty());
    }

    #[test]
    fn test_stale_heartbeat_expires() {
        let manager = ConfigHeartbeatManager::new();
        manager.record(NodeId(1), 1_000, 21_000);
        assert!(!manager.is_alive(NodeId(1), 30_000));
        assert_eq!(manager.expired(30_000), vec![NodeId(1)]);
    }

    #[test]
    fn test_unknown_node_is_not_alive() {
        let manager = ConfigHeartbeatManager::new();
        assert!(!manager.is_alive(NodeId(99), 0));
    }

    #[test]
    fn test_forget_removes_node() {
        let manager = ConfigHeartbeatManager::new();
        manager.record(NodeId(1), 0, 1_000);
        manager.forget(NodeId(1));
        assert!(!manager.is_alive(NodeId(1), 0));
    }
}
