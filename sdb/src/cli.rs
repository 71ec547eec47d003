//! Command-line surface: the client-facing operations, exposed as a
//! standalone binary rather than only a library API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::info;

use crate::ids::{NodeId, QuorumId, ShardId};
use crate::quorum::ClusterTransport;
use crate::routing::Client;
use crate::server::ShardServer;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sdb", version, about = "A distributed, sharded, strongly-consistent key-value store")]
pub struct Cli {
    /// Path to the node's bootstrap configuration file.
    #[arg(short, long, default_value = "sdb.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a shard server node.
    Run {
        /// Shard this node serves.
        #[arg(long)]
        shard_id: u64,

        /// Quorum the shard belongs to.
        #[arg(long)]
        quorum_id: u64,

        /// Other quorum members, as `node_id@host:port`. Empty means a
        /// single-node quorum.
        #[arg(long, value_parser = parse_peer)]
        peer: Vec<(NodeId, String)>,
    },

    /// Print the effective configuration as TOML.
    ShowConfig,

    /// Issue one data operation against a running cluster.
    Route {
        #[arg(long)]
        database: String,
        #[arg(long)]
        table: String,
        #[command(subcommand)]
        op: RouteOp,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum RouteOp {
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] sdb_config::Error),

    #[error(transparent)]
    Toml(#[from] toml::ser::Error),

    #[error(transparent)]
    Server(#[from] crate::server::Error),

    #[error(transparent)]
    Routing(#[from] crate::routing::Error),
}

fn parse_peer(raw: &str) -> Result<(NodeId, String), String> {
    let (id, endpoint) = raw
        .split_once('@')
        .ok_or_else(|| format!("malformed --peer value {raw:?}, expected node_id@host:port"))?;
    let node_id: u64 = id.parse().map_err(|_| format!("invalid node id in {raw:?}"))?;
    Ok((NodeId(node_id), endpoint.to_string()))
}

pub async fn run(
    config: &sdb_config::Config,
    shard_id: u64,
    quorum_id: u64,
    peers: Vec<(NodeId, String)>,
) -> Result<(), Error> {
    let transport = Arc::new(ClusterTransport::new());
    for (node_id, endpoint) in &peers {
        transport.set_endpoint(*node_id, endpoint.clone());
    }
    let peer_ids: Vec<NodeId> = peers.iter().map(|(id, _)| *id).collect();

    let server = ShardServer::bootstrap(
        NodeId(config.node.node_id),
        config.node.endpoint(),
        &config.storage,
        config.general.clone(),
        ShardId(shard_id),
        QuorumId(quorum_id),
        peer_ids,
        transport,
    )
    .await?;

    info!("node {} serving shard {shard_id} in quorum {quorum_id}", config.node.node_id);
    server.listen().await?;
    Ok(())
}

pub fn show_config(config: &sdb_config::Config) -> Result<(), Error> {
    println!("{}", toml::to_string_pretty(config).map_err(Error::Toml)?);
    Ok(())
}

pub async fn route(
    config: &sdb_config::Config,
    database: &str,
    table: &str,
    op: RouteOp,
) -> Result<(), Error> {
    let client = Client::init(
        config.general.clone(),
        config.controllers.endpoints.clone(),
        config.node.node_id,
    )
    .await?;

    client.use_database(database).await?;
    client.use_table(table).await?;

    match op {
        RouteOp::Get { key } => match client.get(key.as_bytes()).await? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(not found)"),
        },
        RouteOp::Set { key, value } => {
            client.set(key.as_bytes(), value.as_bytes()).await?;
        }
        RouteOp::Delete { key } => {
            client.delete(key.as_bytes()).await?;
        }
    }

    Ok(())
}
