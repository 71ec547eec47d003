//! `Environment`: a single shard's storage — active `MemoChunk` plus
//! WAL, a list of immutable `FileChunk`s, recovery, and the background
//! writer/merge compactor.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use sdb_config::General;
use tokio::sync::Mutex;

use crate::ids::{ChunkId, CommandId, LogSegmentId, ShardId};

use super::chunk::FileChunk;
use super::error::Error;
use super::memo::{MemoChunk, Op};
use super::wal::{LogSegment, Record, RecordOp};

/// Records per data page, a proxy for `general.data_page_size` bytes —
/// exact byte packing isn't load-bearing at the scale this engine is
/// exercised at in tests.
const RECORDS_PER_PAGE: usize = 256;

pub struct Environment {
    shard_id: ShardId,
    dir: PathBuf,
    general: General,
    memo: Mutex<MemoChunk>,
    wal: Mutex<LogSegment>,
    chunks: Mutex<Vec<Arc<FileChunk>>>,
    next_chunk_id: AtomicU64,
    next_command_id: AtomicU64,
    next_log_segment_id: AtomicU64,
    stats: EnvironmentStats,
}

/// Plain atomic counters, snapshotted via [`Environment::stats`]. Not a
/// full telemetry/registry subsystem — just enough to back `Debug` and
/// the stub admin routes.
#[derive(Default)]
struct EnvironmentStats {
    sets: AtomicU64,
    deletes: AtomicU64,
    gets: AtomicU64,
    flushes: AtomicU64,
}

/// A point-in-time copy of [`Environment`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvironmentStatsSnapshot {
    pub sets: u64,
    pub deletes: u64,
    pub gets: u64,
    pub flushes: u64,
}

impl Environment {
    /// Open (or recover) a shard's storage directory.
    ///
    /// Recovery: load every `chunk.*` file's contents to learn the
    /// highest `(logSegmentID, logCommandID)` already made durable,
    /// then replay `log.*` files past that watermark into a fresh
    /// memo chunk.
    pub async fn open(dir: PathBuf, shard_id: ShardId, general: General) -> Result<Self, Error> {
        tokio::fs::create_dir_all(&dir).await?;

        let mut chunks = Vec::new();
        let mut max_chunk_id = 0u64;
        let mut watermark = (0u64, 0u64);

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut chunk_paths = Vec::new();
        let mut log_paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("chunk.") {
                if let Ok(id) = rest.parse::<u64>() {
                    chunk_paths.push((id, entry.path()));
                }
            } else if let Some(rest) = name.strip_prefix("log.") {
                if let Ok(id) = rest.parse::<u64>() {
                    log_paths.push((id, entry.path()));
                }
            }
        }
        chunk_paths.sort_by_key(|(id, _)| *id);
        log_paths.sort_by_key(|(id, _)| *id);

        for (id, path) in &chunk_paths {
            let chunk = FileChunk::load(path).await?;
            max_chunk_id = max_chunk_id.max(*id);
            let mark = (chunk.header.log_segment_id.0, chunk.header.log_command_id.0);
            if mark > watermark {
                watermark = mark;
            }
            chunks.push(Arc::new(chunk));
        }

        let mut memo = MemoChunk::new();
        let mut max_command_id = 0u64;
        let mut max_log_segment_id = 0u64;

        for (segment_id, path) in &log_paths {
            max_log_segment_id = max_log_segment_id.max(*segment_id);
            if *segment_id < watermark.0 {
                continue;
            }
            for record in LogSegment::replay(path).await? {
                max_command_id = max_command_id.max(record.command_id.0);
                if *segment_id == watermark.0 && record.command_id.0 <= watermark.1 {
                    continue;
                }
                match record.op {
                    RecordOp::Set { key, value } => memo.set(key, value),
                    RecordOp::Delete { key } => memo.delete(key),
                }
            }
        }

        let next_log_segment_id = max_log_segment_id + 1;
        let wal = LogSegment::create(&dir, LogSegmentId(next_log_segment_id)).await?;

        Ok(Self {
            shard_id,
            dir,
            general,
            memo: Mutex::new(memo),
            wal: Mutex::new(wal),
            chunks: Mutex::new(chunks),
            next_chunk_id: AtomicU64::new(max_chunk_id + 1),
            next_command_id: AtomicU64::new(max_command_id + 1),
            next_log_segment_id: AtomicU64::new(next_log_segment_id + 1),
            stats: EnvironmentStats::default(),
        })
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn stats(&self) -> EnvironmentStatsSnapshot {
        EnvironmentStatsSnapshot {
            sets: self.stats.sets.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            gets: self.stats.gets.load(Ordering::Relaxed),
            flushes: self.stats.flushes.load(Ordering::Relaxed),
        }
    }

    fn next_command_id(&self) -> CommandId {
        CommandId(self.next_command_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn set(&self, key: Bytes, value: Bytes) -> Result<(), Error> {
        let command_id = self.next_command_id();
        self.wal.lock().await.append(&Record {
            command_id,
            op: RecordOp::Set {
                key: key.clone(),
                value: value.clone(),
            },
        }).await?;

        let mut memo = self.memo.lock().await;
        memo.set(key, value);
        drop(memo);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);

        self.maybe_flush().await
    }

    pub async fn delete(&self, key: Bytes) -> Result<(), Error> {
        let command_id = self.next_command_id();
        self.wal.lock().await.append(&Record {
            command_id,
            op: RecordOp::Delete { key: key.clone() },
        }).await?;

        let mut memo = self.memo.lock().await;
        memo.delete(key);
        drop(memo);
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);

        self.maybe_flush().await
    }

    /// Memo chunks (newest first, i.e. just the active one) then file
    /// chunks newest-first.
    pub async fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(op) = self.memo.lock().await.get(key) {
            return match op {
                Op::Set(value) => Some(value.clone()),
                Op::Delete => None,
            };
        }

        for chunk in self.chunks.lock().await.iter().rev() {
            if let Some(op) = chunk.get(key) {
                return match op {
                    Op::Set(value) => Some(value.clone()),
                    Op::Delete => None,
                };
            }
        }
        None
    }

    /// Merge memo + every chunk into one logical view, latest write
    /// per key wins, tombstones filtered, sorted by key, starting
    /// strictly after `start_key` (empty = from the beginning),
    /// capped at `count` entries.
    async fn merged_view(&self, start_key: &[u8], count: usize) -> Vec<(Bytes, Bytes)> {
        use std::collections::BTreeMap;

        let mut merged: BTreeMap<Bytes, Option<Bytes>> = BTreeMap::new();
        for chunk in self.chunks.lock().await.iter() {
            for (key, op) in chunk.iter() {
                merged.insert(
                    key.clone(),
                    match op {
                        Op::Set(v) => Some(v.clone()),
                        Op::Delete => None,
                    },
                );
            }
        }
        for (key, op) in self.memo.lock().await.iter() {
            merged.insert(
                key.clone(),
                match op {
                    Op::Set(v) => Some(v.clone()),
                    Op::Delete => None,
                },
            );
        }

        merged
            .into_iter()
            .filter(|(k, _)| k.as_ref() > start_key)
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .take(count)
            .collect()
    }

    /// Fetch up to `count` entries, capped at `general.list_page_size`;
    /// the `bool` reports whether more entries exist past the page.
    async fn merged_view_page(&self, start_key: &[u8], count: usize) -> (Vec<(Bytes, Bytes)>, bool) {
        let limit = count.min(self.general.list_page_size.max(1));
        let mut items = self.merged_view(start_key, limit + 1).await;
        let has_more = items.len() > limit;
        items.truncate(limit);
        (items, has_more)
    }

    pub async fn list_keys(&self, start_key: &[u8], count: usize) -> (Vec<Bytes>, bool) {
        let (items, has_more) = self.merged_view_page(start_key, count).await;
        (items.into_iter().map(|(k, _)| k).collect(), has_more)
    }

    pub async fn list_key_values(&self, start_key: &[u8], count: usize) -> (Vec<(Bytes, Bytes)>, bool) {
        self.merged_view_page(start_key, count).await
    }

    pub async fn count(&self) -> u64 {
        self.merged_view(b"", usize::MAX).await.len() as u64
    }

    /// Freeze the active memo into a `FileChunk` once it crosses
    /// `general.chunk_size`, then rotate the WAL.
    async fn maybe_flush(&self) -> Result<(), Error> {
        let should_flush = self.memo.lock().await.size_bytes() >= self.general.chunk_size;
        if !should_flush {
            return Ok(());
        }

        let frozen = {
            let mut memo = self.memo.lock().await;
            std::mem::take(&mut *memo)
        };
        if frozen.is_empty() {
            return Ok(());
        }

        let chunk_id = ChunkId(self.next_chunk_id.fetch_add(1, Ordering::SeqCst));
        let last_command_id = CommandId(self.next_command_id.load(Ordering::SeqCst).saturating_sub(1));
        let current_segment_id = LogSegmentId(self.next_log_segment_id.load(Ordering::SeqCst) - 1);

        let records: Vec<(Bytes, Op)> = frozen.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let chunk = FileChunk::build(
            chunk_id,
            current_segment_id,
            last_command_id,
            records,
            RECORDS_PER_PAGE,
            self.general.use_bloom_filter,
            self.general.bloom_threshold,
        );
        chunk.write(&self.dir).await?;

        self.chunks.lock().await.push(Arc::new(chunk));

        let new_segment_id = LogSegmentId(self.next_log_segment_id.fetch_add(1, Ordering::SeqCst));
        let new_wal = LogSegment::create(&self.dir, new_segment_id).await?;
        *self.wal.lock().await = new_wal;
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Collapse the two oldest chunks into one, bounding read
    /// amplification. A real compactor paces itself against
    /// `merge_cpu_threshold`/`merge_buffer_size`; this does one merge
    /// per call, letting the caller decide cadence.
    pub async fn merge_oldest(&self) -> Result<bool, Error> {
        let mut chunks = self.chunks.lock().await;
        if chunks.len() < 2 {
            return Ok(false);
        }

        let older = chunks.remove(0);
        let newer = chunks.remove(0);

        let mut merged: std::collections::BTreeMap<Bytes, Op> = std::collections::BTreeMap::new();
        for (k, v) in older.iter() {
            merged.insert(k.clone(), v.clone());
        }
        for (k, v) in newer.iter() {
            merged.insert(k.clone(), v.clone());
        }

        let chunk_id = ChunkId(self.next_chunk_id.fetch_add(1, Ordering::SeqCst));
        let merged_chunk = FileChunk::build(
            chunk_id,
            newer.header.log_segment_id,
            newer.header.log_command_id,
            merged.into_iter().collect(),
            RECORDS_PER_PAGE,
            self.general.use_bloom_filter,
            self.general.bloom_threshold,
        );
        merged_chunk.write(&self.dir).await?;

        chunks.insert(0, Arc::new(merged_chunk));
        Ok(true)
    }

    pub async fn num_chunks(&self) -> usize {
        self.chunks.lock().await.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn test_env(general: General) -> (tempfile::TempDir, Environment) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::open(dir.path().to_path_buf(), ShardId(1), general)
            .await
            .unwrap();
        (dir, env)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_dir, env) = test_env(General::default()).await;
        env.set(Bytes::from_static(b"k"), Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(env.get(b"k").await, Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_stats_count_operations() {
        let (_dir, env) = test_env(General::default()).await;
        env.set(Bytes::from_static(b"k"), Bytes::from_static(b"v")).await.unwrap();
        env.get(b"k").await;
        env.delete(Bytes::from_static(b"k")).await.unwrap();

        let stats = env.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.gets, 1);
    }

    #[tokio::test]
    async fn test_delete_shadows_chunk_value() {
        let mut general = General::default();
        general.chunk_size = 1; // flush on every write

        let (_dir, env) = test_env(general).await;
        env.set(Bytes::from_static(b"k"), Bytes::from_static(b"v")).await.unwrap();
        env.delete(Bytes::from_static(b"k")).await.unwrap();

        assert_eq!(env.get(b"k").await, None);
    }

    #[tokio::test]
    async fn test_list_keys_merges_memo_and_chunks() {
        let mut general = General::default();
        general.chunk_size = 1;

        let (_dir, env) = test_env(general).await;
        env.set(Bytes::from_static(b"a"), Bytes::from_static(b"1")).await.unwrap();
        env.set(Bytes::from_static(b"b"), Bytes::from_static(b"2")).await.unwrap();

        let (keys, has_more) = env.list_keys(b"", 10).await;
        assert_eq!(keys, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert!(!has_more);
        assert!(env.num_chunks().await >= 1);
    }

    #[tokio::test]
    async fn test_list_keys_pages_past_list_page_size() {
        let mut general = General::default();
        general.list_page_size = 1;

        let (_dir, env) = test_env(general).await;
        env.set(Bytes::from_static(b"a"), Bytes::from_static(b"1")).await.unwrap();
        env.set(Bytes::from_static(b"b"), Bytes::from_static(b"2")).await.unwrap();

        let (keys, has_more) = env.list_keys(b"", 10).await;
        assert_eq!(keys, vec![Bytes::from_static(b"a")]);
        assert!(has_more);

        let (keys, has_more) = env.list_keys(b"a", 10).await;
        assert_eq!(keys, vec![Bytes::from_static(b"b")]);
        assert!(!has_more);
    }

    #[tokio::test]
    async fn test_recovery_replays_uncommitted_log() {
        let general = General::default();
        let dir = tempfile::tempdir().unwrap();

        {
            let env = Environment::open(dir.path().to_path_buf(), ShardId(1), general.clone())
                .await
                .unwrap();
            env.set(Bytes::from_static(b"k"), Bytes::from_static(b"v")).await.unwrap();
        }

        let recovered = Environment::open(dir.path().to_path_buf(), ShardId(1), general)
            .await
            .unwrap();
        assert_eq!(recovered.get(b"k").await, Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_merge_oldest_reduces_chunk_count() {
        let mut general = General::default();
        general.chunk_size = 1;

        let (_dir, env) = test_env(general).await;
        env.set(Bytes::from_static(b"a"), Bytes::from_static(b"1")).await.unwrap();
        env.set(Bytes::from_static(b"b"), Bytes::from_static(b"2")).await.unwrap();
        let before = env.num_chunks().await;
        assert!(before >= 2);

        let merged = env.merge_oldest().await.unwrap();
        assert!(merged);
        assert_eq!(env.num_chunks().await, before - 1);
        assert_eq!(env.get(b"a").await, Some(Bytes::from_static(b"1")));
        assert_eq!(env.get(b"b").await, Some(Bytes::from_static(b"2")));
    }
}
