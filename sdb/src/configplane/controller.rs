//! Controller quorum: owns [`ConfigState`] mutation and hands the
//! shard/routing layers a serialized, versioned snapshot. The
//! controller itself is just another Paxos-replicated state machine
//! (`crate::quorum::Context` running over `crate::configplane` commands
//! instead of key/value commands), so this module only holds the
//! command taxonomy and the pure state transition function — the
//! replication plumbing is shared with shard quorums.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ids::{DatabaseId, NodeId, QuorumId, ShardId, TableId};

use super::error::Error;
use super::state::{
    ConfigState, DatabaseInfo, KeyRange, Migration, QuorumInfo, ShardInfo, ShardServerInfo,
    ShardState, TableInfo,
};

/// A single controller directive, proposed through Paxos and applied to
/// [`ConfigState`] once chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigCommand {
    RegisterShardServer(ShardServerInfo),
    CreateQuorum { quorum_id: QuorumId },
    DeleteQuorum { quorum_id: QuorumId },
    AddNode { quorum_id: QuorumId, node_id: NodeId },
    RemoveNode { quorum_id: QuorumId, node_id: NodeId },
    ActivateNode { quorum_id: QuorumId, node_id: NodeId },
    DeactivateNode { quorum_id: QuorumId, node_id: NodeId },
    SetPrimary { quorum_id: QuorumId, node_id: NodeId },
    CreateDatabase { database_id: DatabaseId, name: String },
    RenameDatabase { database_id: DatabaseId, name: String },
    DeleteDatabase { database_id: DatabaseId },
    CreateTable {
        table_id: TableId,
        database_id: DatabaseId,
        name: String,
        initial_shard_id: ShardId,
        initial_quorum_id: QuorumId,
    },
    RenameTable { table_id: TableId, name: String },
    DeleteTable { table_id: TableId },
    TruncateTable {
        table_id: TableId,
        new_shard_id: ShardId,
        new_quorum_id: QuorumId,
    },
    CompleteTruncate { shard_id: ShardId },
    SplitShard {
        parent_shard_id: ShardId,
        new_shard_id: ShardId,
        split_key: bytes::Bytes,
        new_quorum_id: QuorumId,
    },
    CompleteSplit { new_shard_id: ShardId },
    BeginMigration { migration: Migration },
    CompleteMigration,
}

impl ConfigCommand {
    /// Pure state transition; the only place `ConfigState` is mutated.
    /// Controller state changes only ever follow a chosen Paxos value,
    /// never a direct write.
    pub fn apply(self, state: &mut ConfigState) -> Result<(), Error> {
        match self {
            ConfigCommand::RegisterShardServer(info) => {
                state.shard_servers.insert(info.node_id, info);
            }
            ConfigCommand::CreateQuorum { quorum_id } => {
                state.quorums.entry(quorum_id).or_default();
            }
            ConfigCommand::DeleteQuorum { quorum_id } => {
                let quorum = state
                    .quorums
                    .get(&quorum_id)
                    .ok_or(Error::NoSuchQuorum(quorum_id))?;
                if !quorum.shards.is_empty() {
                    return Err(Error::QuorumNotEmpty(quorum_id));
                }
                state.quorums.remove(&quorum_id);
            }
            ConfigCommand::AddNode { quorum_id, node_id } => {
                let quorum = state
                    .quorums
                    .get_mut(&quorum_id)
                    .ok_or(Error::NoSuchQuorum(quorum_id))?;
                if !quorum.active_nodes.contains(&node_id) && !quorum.inactive_nodes.contains(&node_id) {
                    quorum.inactive_nodes.push(node_id);
                }
            }
            ConfigCommand::RemoveNode { quorum_id, node_id } => {
                let quorum = state
                    .quorums
                    .get_mut(&quorum_id)
                    .ok_or(Error::NoSuchQuorum(quorum_id))?;
                if !quorum.active_nodes.contains(&node_id) && !quorum.inactive_nodes.contains(&node_id) {
                    return Err(Error::NoSuchNode(quorum_id, node_id));
                }
                quorum.active_nodes.retain(|n| *n != node_id);
                quorum.inactive_nodes.retain(|n| *n != node_id);
                if quorum.primary_id == Some(node_id) {
                    quorum.has_primary = false;
                    quorum.primary_id = None;
                }
            }
            ConfigCommand::ActivateNode { quorum_id, node_id } => {
                let quorum = state
                    .quorums
                    .get_mut(&quorum_id)
                    .ok_or(Error::NoSuchQuorum(quorum_id))?;
                if quorum.active_nodes.len() >= super::state::MAX_QUORUM_SIZE {
                    return Err(Error::QuorumFull(quorum_id, quorum.active_nodes.len()));
                }
                quorum.inactive_nodes.retain(|n| *n != node_id);
                if !quorum.active_nodes.contains(&node_id) {
                    quorum.active_nodes.push(node_id);
                }
            }
            ConfigCommand::DeactivateNode { quorum_id, node_id } => {
                let quorum = state
                    .quorums
                    .get_mut(&quorum_id)
                    .ok_or(Error::NoSuchQuorum(quorum_id))?;
                quorum.active_nodes.retain(|n| *n != node_id);
                if quorum.primary_id == Some(node_id) {
                    quorum.has_primary = false;
                    quorum.primary_id = None;
                }
                if !quorum.inactive_nodes.contains(&node_id) {
                    quorum.inactive_nodes.push(node_id);
                }
            }
            ConfigCommand::SetPrimary { quorum_id, node_id } => {
                let quorum = state
                    .quorums
                    .get_mut(&quorum_id)
                    .ok_or(Error::NoSuchQuorum(quorum_id))?;
                if quorum.has_primary && quorum.primary_id != Some(node_id) {
                    return Err(Error::PrimaryAlreadySet(quorum_id));
                }
                if !quorum.active_nodes.contains(&node_id) {
                    return Err(Error::NoSuchQuorum(quorum_id));
                }
                quorum.has_primary = true;
                quorum.primary_id = Some(node_id);
            }
            ConfigCommand::CreateDatabase { database_id, name } => {
                if state.database_id_by_name(&name).is_some() {
                    return Err(Error::NameExists(name));
                }
                state.databases.insert(
                    database_id,
                    DatabaseInfo {
                        name,
                        tables: Vec::new(),
                    },
                );
            }
            ConfigCommand::RenameDatabase { database_id, name } => {
                if state
                    .database_id_by_name(&name)
                    .is_some_and(|id| id != database_id)
                {
                    return Err(Error::NameExists(name));
                }
                state
                    .databases
                    .get_mut(&database_id)
                    .ok_or(Error::NoSuchDatabase(database_id))?
                    .name = name;
            }
            ConfigCommand::DeleteDatabase { database_id } => {
                let db = state
                    .databases
                    .remove(&database_id)
                    .ok_or(Error::NoSuchDatabase(database_id))?;
                for table_id in db.tables {
                    if let Some(table) = state.tables.remove(&table_id) {
                        for shard_id in table.shards {
                            state.shards.remove(&shard_id);
                        }
                    }
                }
            }
            ConfigCommand::CreateTable {
                table_id,
                database_id,
                name,
                initial_shard_id,
                initial_quorum_id,
            } => {
                let db = state
                    .databases
                    .get_mut(&database_id)
                    .ok_or(Error::NoSuchTable(table_id))?;
                db.tables.push(table_id);

                state.tables.insert(
                    table_id,
                    TableInfo {
                        name,
                        database_id,
                        shards: vec![initial_shard_id],
                    },
                );
                state.shards.insert(
                    initial_shard_id,
                    ShardInfo {
                        table_id,
                        quorum_id: initial_quorum_id,
                        range: KeyRange::new(None, None),
                        state: ShardState::Normal,
                        parent_shard_id: None,
                    },
                );
                state
                    .quorums
                    .entry(initial_quorum_id)
                    .or_default()
                    .shards
                    .push(initial_shard_id);
            }
            ConfigCommand::RenameTable { table_id, name } => {
                state
                    .tables
                    .get_mut(&table_id)
                    .ok_or(Error::NoSuchTable(table_id))?
                    .name = name;
            }
            ConfigCommand::DeleteTable { table_id } => {
                let table = state
                    .tables
                    .remove(&table_id)
                    .ok_or(Error::NoSuchTable(table_id))?;
                if let Some(db) = state.databases.get_mut(&table.database_id) {
                    db.tables.retain(|t| *t != table_id);
                }
                for shard_id in table.shards {
                    state.shards.remove(&shard_id);
                }
            }
            ConfigCommand::TruncateTable {
                table_id,
                new_shard_id,
                new_quorum_id,
            } => {
                let table = state
                    .tables
                    .get_mut(&table_id)
                    .ok_or(Error::NoSuchTable(table_id))?;
                let old_shards = std::mem::replace(&mut table.shards, vec![new_shard_id]);
                for shard_id in old_shards {
                    state.shards.remove(&shard_id);
                }
                state.shards.insert(
                    new_shard_id,
                    ShardInfo {
                        table_id,
                        quorum_id: new_quorum_id,
                        range: KeyRange::new(None, None),
                        state: ShardState::TruncCreating,
                        parent_shard_id: None,
                    },
                );
                state
                    .quorums
                    .entry(new_quorum_id)
                    .or_default()
                    .shards
                    .push(new_shard_id);
            }
            ConfigCommand::CompleteTruncate { shard_id } => {
                state
                    .shards
                    .get_mut(&shard_id)
                    .ok_or(Error::NoSuchShard(shard_id))?
                    .state = ShardState::Normal;
            }
            ConfigCommand::SplitShard {
                parent_shard_id,
                new_shard_id,
                split_key,
                new_quorum_id,
            } => {
                let parent = state
                    .shards
                    .get_mut(&parent_shard_id)
                    .ok_or(Error::NoSuchShard(parent_shard_id))?;
                if parent.state != ShardState::Normal {
                    return Err(Error::ShardNotNormal(parent_shard_id));
                }
                let table_id = parent.table_id;
                let new_range = KeyRange::new(Some(split_key.clone()), parent.range.last_key.clone());
                parent.range.last_key = Some(split_key);
                parent.state = ShardState::SplitCreating;

                state.shards.insert(
                    new_shard_id,
                    ShardInfo {
                        table_id,
                        quorum_id: new_quorum_id,
                        range: new_range,
                        state: ShardState::SplitCreating,
                        parent_shard_id: Some(parent_shard_id),
                    },
                );
                state
                    .tables
                    .get_mut(&table_id)
                    .ok_or(Error::NoSuchTable(table_id))?
                    .shards
                    .push(new_shard_id);
                state
                    .quorums
                    .entry(new_quorum_id)
                    .or_default()
                    .shards
                    .push(new_shard_id);
            }
            ConfigCommand::CompleteSplit { new_shard_id } => {
                let shard = state
                    .shards
                    .get_mut(&new_shard_id)
                    .ok_or(Error::NoSuchShard(new_shard_id))?;
                shard.state = ShardState::Normal;
                if let Some(parent_id) = shard.parent_shard_id {
                    if let Some(parent) = state.shards.get_mut(&parent_id) {
                        parent.state = ShardState::Normal;
                    }
                }
            }
            ConfigCommand::BeginMigration { migration } => {
                if state.migration.is_some() {
                    return Err(Error::MigrationInProgress);
                }
                state.migration = Some(migration);
            }
            ConfigCommand::CompleteMigration => {
                state.migration = None;
            }
        }

        state.version += 1;
        Ok(())
    }
}

/// Plain atomic counters, snapshotted via [`Controller::stats`].
#[derive(Debug, Default)]
struct ControllerStats {
    commands_applied: AtomicU64,
    commands_rejected: AtomicU64,
}

/// A point-in-time snapshot of a [`Controller`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStatsSnapshot {
    pub commands_applied: u64,
    pub commands_rejected: u64,
}

/// The controller-side replicated state machine driver: owns the
/// current [`ConfigState`] and a queue of chosen-but-not-yet-applied
/// commands drained by `crate::quorum::Context` as Paxos rounds
/// complete.
#[derive(Debug, Default)]
pub struct Controller {
    state: Mutex<ConfigState>,
    pending: Mutex<VecDeque<ConfigCommand>>,
    stats: ControllerStats,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ControllerStatsSnapshot {
        ControllerStatsSnapshot {
            commands_applied: self.stats.commands_applied.load(Ordering::Relaxed),
            commands_rejected: self.stats.commands_rejected.load(Ordering::Relaxed),
        }
    }

    /// Queue a directive for the next Paxos round to propose. Draining
    /// happens FIFO, one per chosen round — this is the controller's
    /// answer to `GetNextValue()`.
    pub fn enqueue(&self, command: ConfigCommand) {
        self.pending.lock().push_back(command);
    }

    pub fn next_pending(&self) -> Option<ConfigCommand> {
        self.pending.lock().pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Apply a chosen Paxos value to the live state.
    pub fn apply(&self, command: ConfigCommand) -> Result<(), Error> {
        let result = command.apply(&mut self.state.lock());
        match &result {
            Ok(()) => self.stats.commands_applied.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.commands_rejected.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    pub fn snapshot(&self) -> ConfigState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_create_database_then_table_and_resolve() {
        let controller = Controller::new();

        controller
            .apply(ConfigCommand::RegisterShardServer(ShardServerInfo {
                node_id: NodeId(1),
                endpoint: "127.0.0.1".into(),
                sdbp_port: 7080,
                http_port: 8080,
            }))
            .unwrap();
        controller
            .apply(ConfigCommand::CreateQuorum {
                quorum_id: QuorumId(1),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::ActivateNode {
                quorum_id: QuorumId(1),
                node_id: NodeId(1),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::CreateDatabase {
                database_id: DatabaseId(1),
                name: "db".into(),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::CreateTable {
                table_id: TableId(1),
                database_id: DatabaseId(1),
                name: "t".into(),
                initial_shard_id: ShardId(1),
                initial_quorum_id: QuorumId(1),
            })
            .unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.check_invariants().is_ok());
        assert_eq!(
            snapshot.resolve_shard(TableId(1), b"anything"),
            Some(ShardId(1))
        );
    }

    #[test]
    fn test_duplicate_database_name_rejected() {
        let controller = Controller::new();
        controller
            .apply(ConfigCommand::CreateDatabase {
                database_id: DatabaseId(1),
                name: "db".into(),
            })
            .unwrap();
        let err = controller
            .apply(ConfigCommand::CreateDatabase {
                database_id: DatabaseId(2),
                name: "db".into(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::NameExists(_)));
    }

    #[test]
    fn test_split_shard_creates_adjacent_ranges() {
        let controller = Controller::new();
        controller
            .apply(ConfigCommand::CreateDatabase {
                database_id: DatabaseId(1),
                name: "db".into(),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::CreateTable {
                table_id: TableId(1),
                database_id: DatabaseId(1),
                name: "t".into(),
                initial_shard_id: ShardId(1),
                initial_quorum_id: QuorumId(1),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::SplitShard {
                parent_shard_id: ShardId(1),
                new_shard_id: ShardId(2),
                split_key: bytes::Bytes::from_static(b"m"),
                new_quorum_id: QuorumId(2),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::CompleteSplit {
                new_shard_id: ShardId(2),
            })
            .unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.check_invariants().is_ok());
        assert_eq!(snapshot.resolve_shard(TableId(1), b"a"), Some(ShardId(1)));
        assert_eq!(snapshot.resolve_shard(TableId(1), b"z"), Some(ShardId(2)));
    }

    #[test]
    fn test_add_then_remove_node_round_trip() {
        let controller = Controller::new();
        controller
            .apply(ConfigCommand::CreateQuorum {
                quorum_id: QuorumId(1),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::AddNode {
                quorum_id: QuorumId(1),
                node_id: NodeId(5),
            })
            .unwrap();
        assert!(controller
            .snapshot()
            .quorums
            .get(&QuorumId(1))
            .unwrap()
            .inactive_nodes
            .contains(&NodeId(5)));

        controller
            .apply(ConfigCommand::RemoveNode {
                quorum_id: QuorumId(1),
                node_id: NodeId(5),
            })
            .unwrap();
        assert!(controller
            .snapshot()
            .quorums
            .get(&QuorumId(1))
            .unwrap()
            .inactive_nodes
            .is_empty());

        let err = controller
            .apply(ConfigCommand::RemoveNode {
                quorum_id: QuorumId(1),
                node_id: NodeId(5),
            })
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchNode(_, _)));
    }

    #[test]
    fn test_truncate_table_replaces_shards() {
        let controller = Controller::new();
        controller
            .apply(ConfigCommand::CreateDatabase {
                database_id: DatabaseId(1),
                name: "db".into(),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::CreateTable {
                table_id: TableId(1),
                database_id: DatabaseId(1),
                name: "t".into(),
                initial_shard_id: ShardId(1),
                initial_quorum_id: QuorumId(1),
            })
            .unwrap();
        controller
            .apply(ConfigCommand::TruncateTable {
                table_id: TableId(1),
                new_shard_id: ShardId(2),
                new_quorum_id: QuorumId(2),
            })
            .unwrap();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.tables.get(&TableId(1)).unwrap().shards, vec![ShardId(2)]);
        assert!(!snapshot.shards.contains_key(&ShardId(1)));

        controller
            .apply(ConfigCommand::CompleteTruncate {
                shard_id: ShardId(2),
            })
            .unwrap();
        assert_eq!(
            controller.snapshot().shards.get(&ShardId(2)).unwrap().state,
            ShardState::Normal
        );
    }

    #[test]
    fn test_stats_count_applied_and_rejected() {
        let controller = Controller::new();
        controller
            .apply(ConfigCommand::CreateDatabase {
                database_id: DatabaseId(1),
                name: "db".into(),
            })
            .unwrap();
        let _ = controller.apply(ConfigCommand::DeleteDatabase {
            database_id: DatabaseId(2),
        });

        let stats = controller.stats();
        assert_eq!(stats.commands_applied, 1);
        assert_eq!(stats.commands_rejected, 1);
    }

    #[test]
    fn test_pending_queue_drains_fifo() {
        let controller = Controller::new();
        controller.enqueue(ConfigCommand::CreateQuorum {
            quorum_id: QuorumId(1),
        });
        controller.enqueue(ConfigCommand::CreateQuorum {
            quorum_id: QuorumId(2),
        });

        assert_eq!(
            controller.next_pending(),
            Some(ConfigCommand::CreateQuorum {
                quorum_id: QuorumId(1)
            })
        );
        assert!(controller.has_pending());
        controller.next_pending();
        assert!(!controller.has_pending());
    }
}
