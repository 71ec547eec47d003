use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("malformed field at offset {0}")]
    MalformedField(usize),

    #[error("unexpected field count: expected at least {expected}, got {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("unknown request type byte: {0}")]
    UnknownRequestType(u8),

    #[error("unknown response type byte: {0}")]
    UnknownResponseType(u8),

    #[error("unknown cluster message tag: {0}")]
    UnknownClusterTag(String),

    #[error("connection closed")]
    Closed,
}
