use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk layout settings for the Chunk Storage Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; holds one subdirectory per shard.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    pub fn shard_dir(&self, shard_id: u64) -> PathBuf {
        self.data_dir.join(format!("shard.{shard_id:04}"))
    }
}
