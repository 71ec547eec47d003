//! The one-in-flight, controller-bound half of the routing facade.
//! Schema object IDs are minted client-side with the same
//! Snowflake-style generator Paxos proposal IDs use
//! (`crate::ids::IdGenerator`) — the controller accepts a
//! fully-specified `ConfigCommand` rather than allocating IDs itself,
//! so a schema op is a single round trip instead of an allocate-then-
//! commit pair.

use std::sync::Arc;

use crate::configplane::ConfigCommand;
use crate::ids::{DatabaseId, IdGenerator, NodeId, QuorumId, ShardId, TableId};

use super::controller_connection::ControllerConnection;
use super::error::Error;
use super::session::Session;

pub struct SchemaClient {
    controller: Arc<ControllerConnection>,
    session: Arc<Session>,
    ids: IdGenerator,
}

impl SchemaClient {
    pub fn new(controller: Arc<ControllerConnection>, session: Arc<Session>, client_node_id: u64) -> Self {
        Self {
            controller,
            session,
            ids: IdGenerator::new(client_node_id),
        }
    }

    async fn commit(&self, command: ConfigCommand) -> Result<(), Error> {
        self.controller.propose_schema_command(command).await?;
        let state = self.controller.get_config_state().await?;
        self.session.set_config(state);
        Ok(())
    }

    pub async fn create_quorum(&self) -> Result<QuorumId, Error> {
        let quorum_id = QuorumId(self.ids.next().await);
        self.commit(ConfigCommand::CreateQuorum { quorum_id }).await?;
        Ok(quorum_id)
    }

    pub async fn delete_quorum(&self, quorum_id: QuorumId) -> Result<(), Error> {
        self.commit(ConfigCommand::DeleteQuorum { quorum_id }).await
    }

    pub async fn add_node(&self, quorum_id: QuorumId, node_id: NodeId) -> Result<(), Error> {
        self.commit(ConfigCommand::AddNode { quorum_id, node_id }).await
    }

    pub async fn remove_node(&self, quorum_id: QuorumId, node_id: NodeId) -> Result<(), Error> {
        self.commit(ConfigCommand::RemoveNode { quorum_id, node_id }).await
    }

    pub async fn activate_node(&self, quorum_id: QuorumId, node_id: NodeId) -> Result<(), Error> {
        self.commit(ConfigCommand::ActivateNode { quorum_id, node_id }).await
    }

    pub async fn create_database(&self, name: &str) -> Result<DatabaseId, Error> {
        let database_id = DatabaseId(self.ids.next().await);
        self.commit(ConfigCommand::CreateDatabase {
            database_id,
            name: name.to_string(),
        })
        .await?;
        Ok(database_id)
    }

    pub async fn rename_database(&self, database_id: DatabaseId, name: &str) -> Result<(), Error> {
        self.commit(ConfigCommand::RenameDatabase {
            database_id,
            name: name.to_string(),
        })
        .await
    }

    pub async fn delete_database(&self, database_id: DatabaseId) -> Result<(), Error> {
        self.commit(ConfigCommand::DeleteDatabase { database_id }).await
    }

    pub async fn create_table(
        &self,
        database_id: DatabaseId,
        quorum_id: QuorumId,
        name: &str,
    ) -> Result<TableId, Error> {
        let table_id = TableId(self.ids.next().await);
        let initial_shard_id = ShardId(self.ids.next().await);
        self.commit(ConfigCommand::CreateTable {
            table_id,
            database_id,
            name: name.to_string(),
            initial_shard_id,
            initial_quorum_id: quorum_id,
        })
        .await?;
        Ok(table_id)
    }

    pub async fn rename_table(&self, table_id: TableId, name: &str) -> Result<(), Error> {
        self.commit(ConfigCommand::RenameTable {
            table_id,
            name: name.to_string(),
        })
        .await
    }

    pub async fn delete_table(&self, table_id: TableId) -> Result<(), Error> {
        self.commit(ConfigCommand::DeleteTable { table_id }).await
    }

    pub async fn truncate_table(&self, table_id: TableId, new_quorum_id: QuorumId) -> Result<(), Error> {
        let new_shard_id = ShardId(self.ids.next().await);
        self.commit(ConfigCommand::TruncateTable {
            table_id,
            new_shard_id,
            new_quorum_id,
        })
        .await
    }

    pub async fn split_shard(&self, parent_shard_id: ShardId, new_quorum_id: QuorumId, split_key: &[u8]) -> Result<(), Error> {
        let new_shard_id = ShardId(self.ids.next().await);
        self.commit(ConfigCommand::SplitShard {
            parent_shard_id,
            new_shard_id,
            split_key: bytes::Bytes::copy_from_slice(split_key),
            new_quorum_id,
        })
        .await
    }
}
