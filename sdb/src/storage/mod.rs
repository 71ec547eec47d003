//! The chunk storage engine: write-ahead log segments feed an
//! in-memory `MemoChunk`, which freezes into an immutable,
//! Bloom-filtered `FileChunk` once it crosses `general.chunk_size`.

pub mod acceptor_store;
pub mod bloom;
pub mod chunk;
pub mod environment;
pub mod error;
pub mod memo;
pub mod wal;

pub use bloom::BloomFilter;
pub use chunk::{ChunkHeader, FileChunk};
pub use environment::{Environment, EnvironmentStatsSnapshot};
pub use error::Error;
pub use memo::{MemoChunk, Op};
pub use wal::{LogSegment, Record, RecordOp};
