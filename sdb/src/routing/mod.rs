//! Client routing engine: resolves `(table, key)` to a shard primary,
//! pipelines requests to it, and exposes the schema and batching
//! surfaces the rest of the client API is built from.

mod batch;
mod client;
mod controller_connection;
mod data_client;
mod error;
mod result;
mod schema_client;
mod session;
mod shard_connection;

pub use batch::Batch;
pub use client::{Client, ClientStatsSnapshot};
pub use controller_connection::ControllerConnection;
pub use data_client::DataClient;
pub use error::Error;
pub use result::RoutingValue;
pub use schema_client::SchemaClient;
pub use session::Session;
pub use shard_connection::ShardConnection;
