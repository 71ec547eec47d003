//! `ConfigState` — the authoritative, versioned cluster map.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ids::{DatabaseId, NodeId, QuorumId, ShardId, TableId};

use super::error::Error;

pub const MAX_QUORUM_SIZE: usize = 7;

/// A half-open key range `[firstKey, lastKey)`, with `None` standing in
/// for an open (infinite) endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub first_key: Option<Bytes>,
    pub last_key: Option<Bytes>,
}

impl KeyRange {
    pub fn new(first_key: Option<Bytes>, last_key: Option<Bytes>) -> Self {
        Self { first_key, last_key }
    }

    /// `firstKey < key <= lastKey`, open ends always satisfied.
    pub fn contains(&self, key: &[u8]) -> bool {
        let after_first = match &self.first_key {
            Some(first) => key > first.as_ref(),
            None => true,
        };
        let at_or_before_last = match &self.last_key {
            Some(last) => key <= last.as_ref(),
            None => true,
        };
        after_first && at_or_before_last
    }

    /// Two ranges with a shared boundary and no gap or overlap.
    pub fn adjacent_to(&self, next: &KeyRange) -> bool {
        self.last_key == next.first_key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardState {
    Normal,
    SplitCreating,
    TruncCreating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardInfo {
    pub table_id: TableId,
    pub quorum_id: QuorumId,
    pub range: KeyRange,
    pub state: ShardState,
    pub parent_shard_id: Option<ShardId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuorumInfo {
    pub active_nodes: Vec<NodeId>,
    pub inactive_nodes: Vec<NodeId>,
    pub shards: Vec<ShardId>,
    /// Volatile, controller-local field; not part of the replicated
    /// state machine state.
    #[serde(skip)]
    pub has_primary: bool,
    #[serde(skip)]
    pub primary_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardServerInfo {
    pub node_id: NodeId,
    pub endpoint: String,
    pub sdbp_port: u16,
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub tables: Vec<TableId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub database_id: DatabaseId,
    pub shards: Vec<ShardId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub src_shard_id: ShardId,
    pub dst_shard_id: ShardId,
}

/// The authoritative cluster map, versioned by the controller's Paxos
/// round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigState {
    pub version: u64,
    pub shard_servers: BTreeMap<NodeId, ShardServerInfo>,
    pub quorums: BTreeMap<QuorumId, QuorumInfo>,
    pub databases: BTreeMap<DatabaseId, DatabaseInfo>,
    pub tables: BTreeMap<TableId, TableInfo>,
    pub shards: BTreeMap<ShardId, ShardInfo>,
    pub migration: Option<Migration>,
}

impl ConfigState {
    /// Resolve `(tableID, key)` to the shard whose range covers `key`.
    pub fn resolve_shard(&self, table_id: TableId, key: &[u8]) -> Option<ShardId> {
        let table = self.tables.get(&table_id)?;
        table
            .shards
            .iter()
            .find(|shard_id| {
                self.shards
                    .get(shard_id)
                    .is_some_and(|shard| shard.range.contains(key))
            })
            .copied()
    }

    pub fn database_id_by_name(&self, name: &str) -> Option<DatabaseId> {
        self.databases
            .iter()
            .find(|(_, db)| db.name == name)
            .map(|(id, _)| *id)
    }

    pub fn table_id_by_name(&self, database_id: DatabaseId, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|(_, table)| table.database_id == database_id && table.name == name)
            .map(|(id, _)| *id)
    }

    pub fn quorum_primary(&self, quorum_id: QuorumId) -> Option<NodeId> {
        self.quorums
            .get(&quorum_id)
            .filter(|q| q.has_primary)
            .and_then(|q| q.primary_id)
    }

    pub fn node_endpoint(&self, node_id: NodeId) -> Option<&str> {
        self.shard_servers.get(&node_id).map(|s| s.endpoint.as_str())
    }

    /// Validate every structural invariant of the cluster map: shard
    /// ranges partition each table without gaps or overlap, and every
    /// shard's quorum and table references resolve.
    pub fn check_invariants(&self) -> Result<(), Error> {
        for (table_id, table) in &self.tables {
            let mut ranges: Vec<&KeyRange> = Vec::new();
            for shard_id in &table.shards {
                let shard = self
                    .shards
                    .get(shard_id)
                    .ok_or(Error::NoSuchShard(*shard_id))?;
                if shard.table_id != *table_id {
                    return Err(Error::NoSuchTable(*table_id));
                }
                if !self.quorums.contains_key(&shard.quorum_id) {
                    return Err(Error::NoSuchQuorum(shard.quorum_id));
                }
                ranges.push(&shard.range);
            }

            ranges.sort_by(|a, b| a.first_key.cmp(&b.first_key));
            for pair in ranges.windows(2) {
                if !pair[0].adjacent_to(pair[1]) {
                    // windows(2) non-empty implies table.shards has ≥ 2 entries.
                    return Err(Error::ShardNotNormal(*table.shards.first().unwrap()));
                }
            }
        }

        for (quorum_id, quorum) in &self.quorums {
            if quorum.active_nodes.len() > MAX_QUORUM_SIZE {
                return Err(Error::QuorumFull(*quorum_id, quorum.active_nodes.len()));
            }
            for node_id in &quorum.active_nodes {
                if !self.shard_servers.contains_key(node_id) {
                    return Err(Error::NoSuchQuorum(*quorum_id));
                }
            }
            if let Some(primary) = quorum.primary_id {
                if quorum.has_primary && !quorum.active_nodes.contains(&primary) {
                    return Err(Error::PrimaryAlreadySet(*quorum_id));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_shard_state() -> ConfigState {
        let mut state = ConfigState {
            version: 1,
            ..Default::default()
        };

        state.shard_servers.insert(
            NodeId(100),
            ShardServerInfo {
                node_id: NodeId(100),
                endpoint: "10.0.0.1".into(),
                sdbp_port: 7080,
                http_port: 8080,
            },
        );

        state.quorums.insert(
            QuorumId(1),
            QuorumInfo {
                active_nodes: vec![NodeId(100)],
                shards: vec![ShardId(1), ShardId(2)],
                has_primary: true,
                primary_id: Some(NodeId(100)),
                ..Default::default()
            },
        );

        state.databases.insert(
            DatabaseId(1),
            DatabaseInfo {
                name: "db".into(),
                tables: vec![TableId(1)],
            },
        );

        state.tables.insert(
            TableId(1),
            TableInfo {
                name: "t1".into(),
                database_id: DatabaseId(1),
                shards: vec![ShardId(1), ShardId(2)],
            },
        );

        state.shards.insert(
            ShardId(1),
            ShardInfo {
                table_id: TableId(1),
                quorum_id: QuorumId(1),
                range: KeyRange::new(None, Some(Bytes::from_static(b"c"))),
                state: ShardState::Normal,
                parent_shard_id: None,
            },
        );
        state.shards.insert(
            ShardId(2),
            ShardInfo {
                table_id: TableId(1),
                quorum_id: QuorumId(1),
                range: KeyRange::new(Some(Bytes::from_static(b"c")), None),
                state: ShardState::Normal,
                parent_shard_id: None,
            },
        );

        state
    }

    #[test]
    fn test_resolve_shard_splits_at_boundary() {
        let state = two_shard_state();

        assert_eq!(state.resolve_shard(TableId(1), b"a"), Some(ShardId(1)));
        assert_eq!(state.resolve_shard(TableId(1), b"c"), Some(ShardId(1)));
        assert_eq!(state.resolve_shard(TableId(1), b"d"), Some(ShardId(2)));
        assert_eq!(state.resolve_shard(TableId(1), b"z"), Some(ShardId(2)));
    }

    #[test]
    fn test_resolve_shard_unknown_table() {
        let state = two_shard_state();
        assert_eq!(state.resolve_shard(TableId(99), b"a"), None);
    }

    #[test]
    fn test_invariants_hold_for_well_formed_state() {
        let state = two_shard_state();
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_invariants_catch_quorum_overflow() {
        let mut state = two_shard_state();
        let quorum = state.quorums.get_mut(&QuorumId(1)).unwrap();
        quorum.active_nodes = (0..8).map(NodeId).collect();
        assert!(matches!(
            state.check_invariants(),
            Err(Error::QuorumFull(_, 8))
        ));
    }

    #[test]
    fn test_key_range_open_ends() {
        let range = KeyRange::new(None, None);
        assert!(range.contains(b"anything"));
    }
}
