//! SDBP client wire protocol.
//!
//! Request envelope: `<len><commandID><type byte><payload>`; payload
//! fields are colon-delimited, binary blobs prefixed by ASCII length.
//! Response envelope mirrors it. `HELLO` is sent unsolicited by the
//! server on connect and carries no payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ids::{CommandId, TableId};
use crate::net::error::Error;
use crate::net::frame::{read_blob, write_blob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Get = 0,
    Set = 1,
    SetIfNotExists = 2,
    TestAndSet = 3,
    GetAndSet = 4,
    Add = 5,
    Append = 6,
    Delete = 7,
    Remove = 8,
    ListKeys = 9,
    ListKeyValues = 10,
    Count = 11,
    SchemaOp = 12,
    GetConfigState = 13,
}

impl RequestType {
    fn from_u8(b: u8) -> Result<Self, Error> {
        use RequestType::*;
        Ok(match b {
            0 => Get,
            1 => Set,
            2 => SetIfNotExists,
            3 => TestAndSet,
            4 => GetAndSet,
            5 => Add,
            6 => Append,
            7 => Delete,
            8 => Remove,
            9 => ListKeys,
            10 => ListKeyValues,
            11 => Count,
            12 => SchemaOp,
            13 => GetConfigState,
            other => return Err(Error::UnknownRequestType(other)),
        })
    }
}

/// An SDBP request, on or off the wire. `shardConns`, `numTry`,
/// `requestTime`/`responseTime` and other client-local bookkeeping
/// fields live in `crate::routing`, not here — this is only what
/// actually crosses the network.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub command_id: CommandId,
    pub kind: Option<RequestType>,
    pub table_id: Option<TableId>,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    /// `TestAndSet`'s expected-value field.
    pub test_value: Option<Bytes>,
    /// Continuation key for `ListKeys`/`ListKeyValues` paging.
    pub start_key: Option<Bytes>,
    pub count: Option<u64>,
}

impl Request {
    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut out = BytesMut::new();
        out.put_u64(self.command_id.0);
        out.put_u8(self.kind.map(|k| k as u8).unwrap_or(0));

        write_blob(
            &mut out,
            &self.table_id.map(|t| t.0.to_be_bytes()).unwrap_or_default(),
        );
        write_blob(&mut out, self.key.as_deref().unwrap_or_default());
        write_blob(&mut out, self.value.as_deref().unwrap_or_default());
        write_blob(&mut out, self.test_value.as_deref().unwrap_or_default());
        write_blob(&mut out, self.start_key.as_deref().unwrap_or_default());
        write_blob(
            &mut out,
            &self.count.map(|c| c.to_be_bytes()).unwrap_or_default(),
        );

        Ok(out.freeze())
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        if bytes.remaining() < 9 {
            return Err(Error::FieldCount {
                expected: 9,
                got: bytes.remaining(),
            });
        }
        let command_id = CommandId(bytes.get_u64());
        let kind = RequestType::from_u8(bytes.get_u8())?;

        let table_id = non_empty_u64(&mut bytes)?.map(TableId);
        let key = non_empty(&mut bytes)?;
        let value = non_empty(&mut bytes)?;
        let test_value = non_empty(&mut bytes)?;
        let start_key = non_empty(&mut bytes)?;
        let count = non_empty_u64(&mut bytes)?;

        Ok(Self {
            command_id,
            kind: Some(kind),
            table_id,
            key,
            value,
            test_value,
            start_key,
            count,
        })
    }
}

fn non_empty(bytes: &mut Bytes) -> Result<Option<Bytes>, Error> {
    let blob = read_blob(bytes)?;
    Ok(if blob.is_empty() { None } else { Some(blob) })
}

fn non_empty_u64(bytes: &mut Bytes) -> Result<Option<u64>, Error> {
    let blob = read_blob(bytes)?;
    if blob.len() != 8 {
        return Ok(None);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&blob);
    Ok(Some(u64::from_be_bytes(buf)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Ok = 0,
    Number = 1,
    SNumber = 2,
    Value = 3,
    ListKeys = 4,
    ListKeyValues = 5,
    Next = 6,
    NoService = 7,
    BadSchema = 8,
    Failed = 9,
    ConfigState = 10,
    Hello = 11,
}

impl ResponseType {
    fn from_u8(b: u8) -> Result<Self, Error> {
        use ResponseType::*;
        Ok(match b {
            0 => Ok,
            1 => Number,
            2 => SNumber,
            3 => Value,
            4 => ListKeys,
            5 => ListKeyValues,
            6 => Next,
            7 => NoService,
            8 => BadSchema,
            9 => Failed,
            10 => ConfigState,
            11 => Hello,
            other => return Err(Error::UnknownResponseType(other)),
        })
    }
}

/// A `NEXT` response's cursor continuation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextCursor {
    pub last_key: Bytes,
    pub end_key: Bytes,
    pub count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub command_id: CommandId,
    pub kind: Option<ResponseType>,
    pub number: Option<i64>,
    pub value: Option<Bytes>,
    pub keys: Vec<Bytes>,
    pub key_values: Vec<(Bytes, Bytes)>,
    pub next: Option<NextCursor>,
}

impl Response {
    pub fn ok(command_id: CommandId) -> Self {
        Self {
            command_id,
            kind: Some(ResponseType::Ok),
            ..Default::default()
        }
    }

    pub fn value(command_id: CommandId, value: Bytes) -> Self {
        Self {
            command_id,
            kind: Some(ResponseType::Value),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn failed(command_id: CommandId) -> Self {
        Self {
            command_id,
            kind: Some(ResponseType::Failed),
            ..Default::default()
        }
    }

    pub fn no_service(command_id: CommandId) -> Self {
        Self {
            command_id,
            kind: Some(ResponseType::NoService),
            ..Default::default()
        }
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut out = BytesMut::new();
        out.put_u64(self.command_id.0);
        out.put_u8(self.kind.map(|k| k as u8).unwrap_or(9));

        write_blob(
            &mut out,
            &self.number.map(|n| n.to_be_bytes()).unwrap_or_default(),
        );
        write_blob(&mut out, self.value.as_deref().unwrap_or_default());

        out.put_u32(self.keys.len() as u32);
        for key in &self.keys {
            write_blob(&mut out, key);
        }

        out.put_u32(self.key_values.len() as u32);
        for (k, v) in &self.key_values {
            write_blob(&mut out, k);
            write_blob(&mut out, v);
        }

        match &self.next {
            Some(next) => {
                out.put_u8(1);
                write_blob(&mut out, &next.last_key);
                write_blob(&mut out, &next.end_key);
                out.put_u64(next.count);
            }
            None => out.put_u8(0),
        }

        Ok(out.freeze())
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        if bytes.remaining() < 9 {
            return Err(Error::FieldCount {
                expected: 9,
                got: bytes.remaining(),
            });
        }
        let command_id = CommandId(bytes.get_u64());
        let kind = ResponseType::from_u8(bytes.get_u8())?;

        let number_blob = read_blob(&mut bytes)?;
        let number = if number_blob.len() == 8 {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&number_blob);
            Some(i64::from_be_bytes(buf))
        } else {
            None
        };

        let value = non_empty(&mut bytes)?;

        let num_keys = bytes.get_u32();
        let mut keys = Vec::with_capacity(num_keys as usize);
        for _ in 0..num_keys {
            keys.push(read_blob(&mut bytes)?);
        }

        let num_kv = bytes.get_u32();
        let mut key_values = Vec::with_capacity(num_kv as usize);
        for _ in 0..num_kv {
            let k = read_blob(&mut bytes)?;
            let v = read_blob(&mut bytes)?;
            key_values.push((k, v));
        }

        let has_next = bytes.get_u8();
        let next = if has_next == 1 {
            let last_key = read_blob(&mut bytes)?;
            let end_key = read_blob(&mut bytes)?;
            let count = bytes.get_u64();
            Some(NextCursor {
                last_key,
                end_key,
                count,
            })
        } else {
            None
        };

        Ok(Self {
            command_id,
            kind: Some(kind),
            number,
            value,
            keys,
            key_values,
            next,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_roundtrip_set() {
        let req = Request {
            command_id: CommandId(42),
            kind: Some(RequestType::Set),
            table_id: Some(TableId(7)),
            key: Some(Bytes::from_static(b"k")),
            value: Some(Bytes::from_static(b"v")),
            ..Default::default()
        };

        let encoded = req.encode().unwrap();
        let decoded = Request::decode(encoded).unwrap();

        assert_eq!(decoded.command_id, CommandId(42));
        assert_eq!(decoded.kind, Some(RequestType::Set));
        assert_eq!(decoded.table_id, Some(TableId(7)));
        assert_eq!(decoded.key.as_deref(), Some(&b"k"[..]));
        assert_eq!(decoded.value.as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn test_request_roundtrip_get_no_value() {
        let req = Request {
            command_id: CommandId(1),
            kind: Some(RequestType::Get),
            table_id: Some(TableId(1)),
            key: Some(Bytes::from_static(b"key")),
            ..Default::default()
        };
        let decoded = Request::decode(req.encode().unwrap()).unwrap();
        assert_eq!(decoded.value, None);
        assert_eq!(decoded.test_value, None);
    }

    #[test]
    fn test_response_roundtrip_value() {
        let resp = Response::value(CommandId(9), Bytes::from_static(b"hello"));
        let decoded = Response::decode(resp.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind, Some(ResponseType::Value));
        assert_eq!(decoded.value.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_response_roundtrip_next_cursor() {
        let resp = Response {
            command_id: CommandId(3),
            kind: Some(ResponseType::Next),
            next: Some(NextCursor {
                last_key: Bytes::from_static(b"m"),
                end_key: Bytes::from_static(b"z"),
                count: 17,
            }),
            ..Default::default()
        };
        let decoded = Response::decode(resp.encode().unwrap()).unwrap();
        let next = decoded.next.unwrap();
        assert_eq!(next.last_key, Bytes::from_static(b"m"));
        assert_eq!(next.count, 17);
    }

    #[test]
    fn test_response_roundtrip_list_keys() {
        let resp = Response {
            command_id: CommandId(5),
            kind: Some(ResponseType::ListKeys),
            keys: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
            ..Default::default()
        };
        let decoded = Response::decode(resp.encode().unwrap()).unwrap();
        assert_eq!(decoded.keys.len(), 2);
        assert_eq!(decoded.keys[1], Bytes::from_static(b"b"));
    }

    #[test]
    fn test_unknown_request_type_errors() {
        let mut out = BytesMut::new();
        out.put_u64(1);
        out.put_u8(250);
        let err = Request::decode(out.freeze()).unwrap_err();
        assert!(matches!(err, Error::UnknownRequestType(250)));
    }
}
