//! The value half of a completed request. Transport, timeout, and
//! command status collapse onto [`crate::routing::Error`] variants
//! instead of a separate status triple — callers match on
//! `Result<RoutingValue, Error>` the way any other fallible Rust call
//! is handled, rather than polling three separate status accessors.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingValue {
    Ok,
    Number(i64),
    Value(Option<Bytes>),
    Keys(Vec<Bytes>),
    KeyValues(Vec<(Bytes, Bytes)>),
}

impl RoutingValue {
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            RoutingValue::Value(v) => v,
            _ => None,
        }
    }

    pub fn into_number(self) -> Option<i64> {
        match self {
            RoutingValue::Number(n) => Some(n),
            _ => None,
        }
    }
}
