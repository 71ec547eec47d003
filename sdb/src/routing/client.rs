//! The top-level routing facade: composes [`DataClient`] and
//! [`SchemaClient`] over a shared [`Session`], resolves database/table
//! names against the cached `ConfigState`, and retries once after a
//! config refresh when a shard server reports `NOSERVICE` — the
//! client-side half of reassignment.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use super::batch::Batch;
use super::controller_connection::ControllerConnection;
use super::data_client::DataClient;
use super::error::Error;
use super::schema_client::SchemaClient;
use super::session::Session;

/// Plain atomic counters, snapshotted via [`Client::stats`].
#[derive(Default)]
struct ClientStats {
    requests: AtomicU64,
    reassignments: AtomicU64,
}

/// A point-in-time snapshot of a [`Client`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStatsSnapshot {
    pub requests: u64,
    pub reassignments: u64,
}

pub struct Client {
    session: Arc<Session>,
    controller: Arc<ControllerConnection>,
    data: Arc<DataClient>,
    schema: Arc<SchemaClient>,
    stats: ClientStats,
}

impl Client {
    /// Connect to the controller quorum and pull the initial
    /// `ConfigState`.
    pub async fn init(
        general: sdb_config::General,
        controller_endpoints: Vec<String>,
        client_node_id: u64,
    ) -> Result<Self, Error> {
        let session = Arc::new(Session::new(general));
        let controller = Arc::new(ControllerConnection::new(controller_endpoints));
        let data = Arc::new(DataClient::new(session.clone()));
        let schema = Arc::new(SchemaClient::new(controller.clone(), session.clone(), client_node_id));

        let client = Self {
            session,
            controller,
            data,
            schema,
            stats: ClientStats::default(),
        };
        client.refresh_config().await?;
        Ok(client)
    }

    pub fn stats(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            requests: self.stats.requests.load(Ordering::Relaxed),
            reassignments: self.stats.reassignments.load(Ordering::Relaxed),
        }
    }

    /// Drop cached shard connections. The controller connection and any
    /// in-flight batch are abandoned along with it; there is no
    /// server-side session to tear down.
    pub fn shutdown(self) {}

    pub fn data(&self) -> &Arc<DataClient> {
        &self.data
    }

    pub fn schema(&self) -> &Arc<SchemaClient> {
        &self.schema
    }

    pub fn begin_batch(&self) -> Batch {
        Batch::new(self.data.clone(), self.session.clone())
    }

    async fn refresh_config(&self) -> Result<(), Error> {
        let state = self.controller.get_config_state().await?;
        self.session.set_config(state);
        Ok(())
    }

    pub async fn use_database(&self, name: &str) -> Result<(), Error> {
        if self.session.config().database_id_by_name(name).is_none() {
            self.refresh_config().await?;
        }
        let database_id = self
            .session
            .config()
            .database_id_by_name(name)
            .ok_or_else(|| Error::NoSuchDatabase(name.to_string()))?;
        self.session.use_database(database_id);
        Ok(())
    }

    pub async fn use_table(&self, name: &str) -> Result<(), Error> {
        let database_id = self
            .session
            .current_database()
            .ok_or_else(|| Error::NoSuchDatabase(String::new()))?;

        if self
            .session
            .config()
            .table_id_by_name(database_id, name)
            .is_none()
        {
            self.refresh_config().await?;
        }
        let table_id = self
            .session
            .config()
            .table_id_by_name(database_id, name)
            .ok_or_else(|| Error::NoSuchTable(name.to_string(), database_id))?;
        self.session.use_table(table_id);
        Ok(())
    }

    /// Run a data op; on `NOSERVICE` refresh the config once (picking up
    /// a new primary) and retry exactly once.
    async fn with_reassign<F, Fut, T>(&self, op: F) -> Result<T, Error>
    where
        F: Fn(Arc<DataClient>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        match op(self.data.clone()).await {
            Err(Error::NoService(_)) => {
                self.stats.reassignments.fetch_add(1, Ordering::Relaxed);
                self.refresh_config().await?;
                op(self.data.clone()).await
            }
            other => other,
        }
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        let key = key.to_vec();
        self.with_reassign(move |client| {
            let key = key.clone();
            async move { client.get(&key).await }
        })
        .await
    }

    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.with_reassign(move |client| {
            let (key, value) = (key.clone(), value.clone());
            async move { client.set(&key, &value).await }
        })
        .await
    }

    pub async fn set_if_not_exists(&self, key: &[u8], value: &[u8]) -> Result<bool, Error> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.with_reassign(move |client| {
            let (key, value) = (key.clone(), value.clone());
            async move { client.set_if_not_exists(&key, &value).await }
        })
        .await
    }

    pub async fn test_and_set(&self, key: &[u8], test_value: &[u8], value: &[u8]) -> Result<bool, Error> {
        let key = key.to_vec();
        let test_value = test_value.to_vec();
        let value = value.to_vec();
        self.with_reassign(move |client| {
            let (key, test_value, value) = (key.clone(), test_value.clone(), value.clone());
            async move { client.test_and_set(&key, &test_value, &value).await }
        })
        .await
    }

    pub async fn get_and_set(&self, key: &[u8], value: &[u8]) -> Result<Option<Bytes>, Error> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.with_reassign(move |client| {
            let (key, value) = (key.clone(), value.clone());
            async move { client.get_and_set(&key, &value).await }
        })
        .await
    }

    pub async fn add(&self, key: &[u8], delta: i64) -> Result<i64, Error> {
        let key = key.to_vec();
        self.with_reassign(move |client| {
            let key = key.clone();
            async move { client.add(&key, delta).await }
        })
        .await
    }

    pub async fn append(&self, key: &[u8], suffix: &[u8]) -> Result<Bytes, Error> {
        let key = key.to_vec();
        let suffix = suffix.to_vec();
        self.with_reassign(move |client| {
            let (key, suffix) = (key.clone(), suffix.clone());
            async move { client.append(&key, &suffix).await }
        })
        .await
    }

    pub async fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let key = key.to_vec();
        self.with_reassign(move |client| {
            let key = key.clone();
            async move { client.delete(&key).await }
        })
        .await
    }

    pub async fn remove(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        let key = key.to_vec();
        self.with_reassign(move |client| {
            let key = key.clone();
            async move { client.remove(&key).await }
        })
        .await
    }

    pub async fn list_keys(&self, start_key: &[u8], count: u64) -> Result<Vec<Bytes>, Error> {
        let start_key = start_key.to_vec();
        self.with_reassign(move |client| {
            let start_key = start_key.clone();
            async move { client.list_keys(&start_key, count).await }
        })
        .await
    }

    pub async fn list_key_values(&self, start_key: &[u8], count: u64) -> Result<Vec<(Bytes, Bytes)>, Error> {
        let start_key = start_key.to_vec();
        self.with_reassign(move |client| {
            let start_key = start_key.clone();
            async move { client.list_key_values(&start_key, count).await }
        })
        .await
    }

    pub async fn count(&self, start_key: &[u8], count: u64) -> Result<i64, Error> {
        let start_key = start_key.to_vec();
        self.with_reassign(move |client| {
            let start_key = start_key.clone();
            async move { client.count(&start_key, count).await }
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_init_fails_without_controllers() {
        let err = Client::init(sdb_config::General::default(), vec![], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoControllers));
    }

    #[tokio::test]
    async fn test_use_database_without_controllers_errors() {
        let session = Arc::new(Session::new(sdb_config::General::default()));
        let controller = Arc::new(ControllerConnection::new(vec![]));
        let data = Arc::new(DataClient::new(session.clone()));
        let schema = Arc::new(SchemaClient::new(controller.clone(), session.clone(), 1));
        let client = Client {
            session,
            controller,
            data,
            schema,
            stats: ClientStats::default(),
        };

        let err = client.use_database("db").await.unwrap_err();
        assert!(matches!(err, Error::NoControllers));
    }

    #[tokio::test]
    async fn test_stats_count_requests_and_reassignments() {
        let session = Arc::new(Session::new(sdb_config::General::default()));
        let controller = Arc::new(ControllerConnection::new(vec![]));
        let data = Arc::new(DataClient::new(session.clone()));
        let schema = Arc::new(SchemaClient::new(controller.clone(), session.clone(), 1));
        let client = Client {
            session,
            controller,
            data,
            schema,
            stats: ClientStats::default(),
        };

        // No table selected, so every op fails before reaching the
        // network — still counts as a request, never a reassignment.
        let _ = client.get(b"k").await;
        let stats = client.stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.reassignments, 0);
    }
}
