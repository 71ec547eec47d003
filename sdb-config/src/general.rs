use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default duration a `PaxosLease` grants its holder before it must be
/// renewed.
pub const PAXOSLEASE_MAX_LEASE_TIME_MS: u64 = 7_000;

/// Client-side `masterTimeout` default: `3 × PAXOSLEASE_MAX_LEASE_TIME_MS`.
pub const DEFAULT_MASTER_TIMEOUT_MS: u64 = 3 * PAXOSLEASE_MAX_LEASE_TIME_MS;

/// Client-side `globalTimeout` default.
pub const DEFAULT_GLOBAL_TIMEOUT_MS: u64 = 120_000;

/// Default request-batch size cap, in bytes.
pub const DEFAULT_BATCH_LIMIT: u64 = 100 * 1024 * 1024;

/// Field length below which a request field doesn't count toward
/// `batchLimit`: `Σ max(0, fieldLen - smallStringThreshold)`.
pub const DEFAULT_SMALL_STRING_THRESHOLD: u64 = 128;

/// Default shard split threshold, in bytes (default 500 MiB).
pub const DEFAULT_SHARD_SPLIT_THRESHOLD: u64 = 500 * 1024 * 1024;

/// Max keys/key-value pairs a single `ListKeys`/`ListKeyValues` response
/// carries before the shard server hands back a `NEXT` continuation.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1_000;

/// Tunables governing timing, sizing, and thresholds across the data
/// plane: one flat, `#[serde(default)]` struct with documented
/// per-field defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct General {
    /// `PaxosLease` duration in milliseconds.
    pub paxos_lease_time_ms: u64,
    /// Client `masterTimeout` in milliseconds.
    pub master_timeout_ms: u64,
    /// Client `globalTimeout` in milliseconds.
    pub global_timeout_ms: u64,
    /// Batch size cap in bytes.
    pub batch_limit: u64,
    /// Small-string threshold used in batch size accounting.
    pub small_string_threshold: u64,
    /// Threshold, in bytes, at which an active `MemoChunk` is frozen and
    /// serialized into a `FileChunk`.
    pub chunk_size: u64,
    /// Target page size for `DataPage`s within a `FileChunk`.
    pub data_page_size: u32,
    /// Minimum number of keys in a chunk before a Bloom filter is built.
    pub bloom_threshold: u64,
    /// Whether new chunks get a Bloom filter at all.
    pub use_bloom_filter: bool,
    /// CPU budget share the background merge compactor is allowed to use.
    pub merge_cpu_threshold: f64,
    /// Buffer size used while merging chunk files.
    pub merge_buffer_size: usize,
    /// Shard split size threshold in bytes (`ConfigHeartbeatManager`).
    pub shard_split_threshold: u64,
    /// Cooldown after a split/heartbeat-triggered action before another
    /// may fire for the same quorum, to prevent flapping.
    pub split_cooldown_ms: u64,
    /// Heartbeat cadence shard servers send to the controller.
    pub heartbeat_interval_ms: u64,
    /// How long a missed heartbeat window is tolerated before the
    /// controller clears a quorum's primary.
    pub heartbeat_timeout_ms: u64,
    /// Write-buffer saturation threshold that triggers `Flush()`.
    pub write_buffer_threshold: usize,
    /// How long a disconnected shard connection waits before it is
    /// allowed to reconnect.
    pub connect_timeout_ms: u64,
    /// Max keys/key-value pairs per `ListKeys`/`ListKeyValues` response
    /// page before a `NEXT` continuation is returned.
    pub list_page_size: usize,
}

impl Default for General {
    fn default() -> Self {
        Self {
            paxos_lease_time_ms: PAXOSLEASE_MAX_LEASE_TIME_MS,
            master_timeout_ms: DEFAULT_MASTER_TIMEOUT_MS,
            global_timeout_ms: DEFAULT_GLOBAL_TIMEOUT_MS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            small_string_threshold: DEFAULT_SMALL_STRING_THRESHOLD,
            chunk_size: 64 * 1024 * 1024,
            data_page_size: 64 * 1024,
            bloom_threshold: 1_000,
            use_bloom_filter: true,
            merge_cpu_threshold: 0.5,
            merge_buffer_size: 4 * 1024 * 1024,
            shard_split_threshold: DEFAULT_SHARD_SPLIT_THRESHOLD,
            split_cooldown_ms: 60_000,
            heartbeat_interval_ms: 1_000,
            heartbeat_timeout_ms: 5_000,
            write_buffer_threshold: 1024 * 1024,
            connect_timeout_ms: 3_000,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }
}

impl General {
    pub fn paxos_lease_time(&self) -> Duration {
        Duration::from_millis(self.paxos_lease_time_ms)
    }

    pub fn master_timeout(&self) -> Duration {
        Duration::from_millis(self.master_timeout_ms)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn split_cooldown(&self) -> Duration {
        Duration::from_millis(self.split_cooldown_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_master_timeout_is_3x_lease() {
        let general = General::default();
        assert_eq!(
            general.master_timeout_ms,
            3 * general.paxos_lease_time_ms
        );
    }

    #[test]
    fn test_default_serializable() {
        let general = General::default();
        toml::to_string(&general).unwrap();
    }
}
