//! `ShardQuorumProcessor`: the consumer half of a shard quorum's
//! `crate::quorum::Context`, applying learned [`ShardCommand`]s to
//! storage and remembering request-shaped results (the "old value" a
//! `GetAndSet`/`TestAndSet`/`Add`/`Remove` needs to hand back to the
//! client that issued it) until `crate::routing` collects them.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::quorum::{Error as QuorumError, LogConsumer};
use crate::storage::acceptor_store::ACCEPTOR_KEY_PREFIX;
use crate::storage::Environment;

use super::command::ShardCommand;
use super::error::Error;

pub struct ShardQuorumProcessor {
    env: Arc<Environment>,
    results: Mutex<HashMap<u64, Bytes>>,
}

impl ShardQuorumProcessor {
    pub fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Collect (and forget) the side value a chosen command produced,
    /// if any — the routing layer calls this once per proposed command
    /// to build the client-facing response.
    pub async fn take_result(&self, log_position: u64) -> Option<Bytes> {
        self.results.lock().await.remove(&log_position)
    }

    pub async fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.env.get(key).await
    }

    pub async fn list_keys(&self, start_key: &[u8], count: usize) -> (Vec<Bytes>, bool) {
        self.env.list_keys(start_key, count).await
    }

    pub async fn list_key_values(&self, start_key: &[u8], count: usize) -> (Vec<(Bytes, Bytes)>, bool) {
        self.env.list_key_values(start_key, count).await
    }

    pub async fn count(&self) -> u64 {
        self.env.count().await
    }

    async fn apply_command(&self, cmd: ShardCommand) -> Result<Option<Bytes>, Error> {
        if cmd.key().starts_with(ACCEPTOR_KEY_PREFIX) {
            return Err(Error::ReservedKey);
        }

        Ok(match cmd {
            ShardCommand::Set { key, value } => {
                self.env.set(key, value).await?;
                None
            }
            ShardCommand::SetIfNotExists { key, value } => {
                let absent = self.env.get(&key).await.is_none();
                if absent {
                    self.env.set(key, value).await?;
                }
                Some(Bytes::from_static(if absent { b"1" } else { b"0" }))
            }
            ShardCommand::TestAndSet { key, test_value, value } => {
                let matched = self.env.get(&key).await.as_deref() == Some(test_value.as_ref());
                if matched {
                    self.env.set(key, value).await?;
                }
                Some(Bytes::from_static(if matched { b"1" } else { b"0" }))
            }
            ShardCommand::GetAndSet { key, value } => {
                let old = self.env.get(&key).await.unwrap_or_default();
                self.env.set(key, value).await?;
                Some(old)
            }
            ShardCommand::Add { key, delta } => {
                let current = self
                    .env
                    .get(&key)
                    .await
                    .and_then(|v| std::str::from_utf8(&v).ok().and_then(|s| s.parse::<i64>().ok()))
                    .unwrap_or(0);
                let updated = Bytes::from((current + delta).to_string());
                self.env.set(key, updated.clone()).await?;
                Some(updated)
            }
            ShardCommand::Append { key, suffix } => {
                let mut updated = self.env.get(&key).await.map(|v| v.to_vec()).unwrap_or_default();
                updated.extend_from_slice(&suffix);
                let updated = Bytes::from(updated);
                self.env.set(key, updated.clone()).await?;
                Some(updated)
            }
            ShardCommand::Delete { key } => {
                self.env.delete(key).await?;
                None
            }
            ShardCommand::Remove { key } => {
                let old = self.env.get(&key).await;
                self.env.delete(key).await?;
                old
            }
        })
    }
}

#[async_trait::async_trait]
impl LogConsumer for ShardQuorumProcessor {
    async fn apply(&self, log_position: u64, value: Bytes) -> Result<(), QuorumError> {
        let cmd = ShardCommand::decode(value)
            .map_err(|e| QuorumError::Consumer(log_position, e.to_string()))?;
        let result = self
            .apply_command(cmd)
            .await
            .map_err(|e| QuorumError::Consumer(log_position, e.to_string()))?;

        if let Some(result) = result {
            self.results.lock().await.insert(log_position, result);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::ShardId;
    use sdb_config::General;

    async fn test_processor() -> (tempfile::TempDir, ShardQuorumProcessor) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::open(dir.path().to_path_buf(), ShardId(1), General::default())
            .await
            .unwrap();
        (dir, ShardQuorumProcessor::new(Arc::new(env)))
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_dir, processor) = test_processor().await;
        processor
            .apply(
                0,
                ShardCommand::Set {
                    key: Bytes::from_static(b"k"),
                    value: Bytes::from_static(b"v"),
                }
                .encode(),
            )
            .await
            .unwrap();
        assert_eq!(processor.get(b"k").await, Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_test_and_set_records_result() {
        let (_dir, processor) = test_processor().await;
        processor
            .apply(0, ShardCommand::Set { key: Bytes::from_static(b"k"), value: Bytes::from_static(b"old") }.encode())
            .await
            .unwrap();

        processor
            .apply(
                1,
                ShardCommand::TestAndSet {
                    key: Bytes::from_static(b"k"),
                    test_value: Bytes::from_static(b"old"),
                    value: Bytes::from_static(b"new"),
                }
                .encode(),
            )
            .await
            .unwrap();

        assert_eq!(processor.take_result(1).await, Some(Bytes::from_static(b"1")));
        assert_eq!(processor.get(b"k").await, Some(Bytes::from_static(b"new")));
    }

    #[tokio::test]
    async fn test_add_accumulates() {
        let (_dir, processor) = test_processor().await;
        processor
            .apply(0, ShardCommand::Add { key: Bytes::from_static(b"n"), delta: 5 }.encode())
            .await
            .unwrap();
        processor
            .apply(1, ShardCommand::Add { key: Bytes::from_static(b"n"), delta: -2 }.encode())
            .await
            .unwrap();

        assert_eq!(processor.get(b"n").await, Some(Bytes::from_static(b"3")));
        assert_eq!(processor.take_result(1).await, Some(Bytes::from_static(b"3")));
    }

    #[tokio::test]
    async fn test_reserved_key_rejected() {
        let (_dir, processor) = test_processor().await;
        let err = processor
            .apply(
                0,
                ShardCommand::Set {
                    key: Bytes::from_static(ACCEPTOR_KEY_PREFIX),
                    value: Bytes::from_static(b"v"),
                }
                .encode(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QuorumError::Consumer(0, _)));
    }
}
