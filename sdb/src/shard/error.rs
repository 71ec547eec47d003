use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] crate::storage::Error),

    #[error("malformed shard command")]
    MalformedCommand,

    #[error("test-and-set mismatch on key")]
    TestValueMismatch,

    #[error("key falls outside this shard's range")]
    KeyOutOfRange,

    #[error("reserved key prefix, not addressable by clients")]
    ReservedKey,
}
