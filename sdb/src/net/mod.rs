//! The event/IO substrate and the wire formats it carries — the client
//! SDBP protocol and the inter-node cluster protocol.
//!
//! Framing is length-prefixed, the same shape as Postgres message
//! framing (`Buffer::read`/`write` over a `Stream`), but the payload
//! encoding is colon-delimited text fields with length-prefixed binary
//! blobs rather than Postgres's typed binary messages.

pub mod cluster;
pub mod error;
pub mod frame;
pub mod message;
pub mod stream;

pub use error::Error;
pub use frame::Frame;
pub use message::{NextCursor, Request, RequestType, Response, ResponseType};
pub use stream::Stream;
