use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt WAL record at offset {0}: checksum mismatch")]
    WalChecksumMismatch(u64),

    #[error("corrupt chunk {0}: checksum mismatch in {1}")]
    ChunkChecksumMismatch(u64, &'static str),

    #[error("chunk {0} not found")]
    ChunkNotFound(u64),

    #[error("truncated record while reading {0}")]
    Truncated(&'static str),
}
