use thiserror::Error;

use crate::ids::{DatabaseId, NodeId, QuorumId, ShardId, TableId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("no such quorum: {0:?}")]
    NoSuchQuorum(QuorumId),

    #[error("no such shard: {0:?}")]
    NoSuchShard(ShardId),

    #[error("no such table: {0:?}")]
    NoSuchTable(TableId),

    #[error("no such database: {0:?}")]
    NoSuchDatabase(DatabaseId),

    #[error("node {1:?} is not a member of quorum {0:?}")]
    NoSuchNode(QuorumId, NodeId),

    #[error("quorum {0:?} still has shards assigned, cannot delete")]
    QuorumNotEmpty(QuorumId),

    #[error("database/table name already exists: {0}")]
    NameExists(String),

    #[error("quorum {0:?} already has {1} active members (max 7)")]
    QuorumFull(QuorumId, usize),

    #[error("quorum {0:?} already has a primary")]
    PrimaryAlreadySet(QuorumId),

    #[error("shard {0:?} is not in NORMAL state")]
    ShardNotNormal(ShardId),

    #[error("a migration is already in progress")]
    MigrationInProgress,
}
