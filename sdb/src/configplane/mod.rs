//! The Config Plane: the controller side that owns and mutates
//! [`state::ConfigState`], and the shard/client-side cache that
//! consumes it.

pub mod controller;
pub mod error;
pub mod heartbeat;
pub mod state;

pub use controller::{ConfigCommand, Controller, ControllerStatsSnapshot};
pub use error::Error;
pub use heartbeat::{ConfigHeartbeatManager, Heartbeat};
pub use state::{
    ConfigState, DatabaseInfo, Migration, QuorumInfo, ShardInfo, ShardServerInfo, ShardState,
    TableInfo,
};
