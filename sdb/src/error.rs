//! Top-level error aggregation. Each layer owns its own error enum;
//! this just lets `main`/`cli` and any cross-layer glue code propagate
//! any of them with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Net(#[from] crate::net::Error),

    #[error(transparent)]
    Paxos(#[from] crate::paxos::Error),

    #[error(transparent)]
    Quorum(#[from] crate::quorum::Error),

    #[error(transparent)]
    Shard(#[from] crate::shard::Error),

    #[error(transparent)]
    Storage(#[from] crate::storage::Error),

    #[error(transparent)]
    ConfigPlane(#[from] crate::configplane::Error),

    #[error(transparent)]
    Routing(#[from] crate::routing::Error),

    #[error(transparent)]
    Admin(#[from] crate::admin::Error),

    #[error(transparent)]
    Server(#[from] crate::server::Error),

    #[error(transparent)]
    Cli(#[from] crate::cli::Error),

    #[error("configuration error: {0}")]
    Config(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
