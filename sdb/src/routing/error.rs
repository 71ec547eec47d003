use thiserror::Error;

use crate::ids::{CommandId, DatabaseId, NodeId, QuorumId, TableId};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Net(#[from] crate::net::Error),

    #[error("no database named {0:?}")]
    NoSuchDatabase(String),

    #[error("no table named {0:?} in database {1:?}")]
    NoSuchTable(String, DatabaseId),

    #[error("no table selected, call UseTable first")]
    NoTableSelected,

    #[error("no shard covers this key in table {0:?}")]
    NoShardForKey(TableId),

    #[error("no primary elected for quorum {0:?}")]
    NoPrimary(QuorumId),

    #[error("shard server {0:?} is not registered in the config state")]
    NoSuchNode(NodeId),

    #[error("request {0:?} failed at the server")]
    ServerFailed(CommandId),

    #[error("shard server reported NOSERVICE for request {0:?}")]
    NoService(CommandId),

    #[error("schema mismatch for request {0:?}")]
    BadSchema(CommandId),

    #[error("no controllers configured")]
    NoControllers,

    #[error("controller unreachable: {0}")]
    ControllerUnreachable(String),

    #[error("request {0:?} timed out")]
    Timeout(CommandId),

    #[error("request exceeds configured batch limit")]
    BatchLimitExceeded,

    #[error("batch was cancelled")]
    BatchCancelled,

    #[error("unexpected response shape for this request")]
    UnexpectedResponse,
}
