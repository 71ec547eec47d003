//! The value a shard quorum actually proposes through Paxos: one data
//! mutation, not the SDBP request envelope (which also carries
//! client-routing bookkeeping that never needs to be replicated).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardCommand {
    Set { key: Bytes, value: Bytes },
    SetIfNotExists { key: Bytes, value: Bytes },
    TestAndSet { key: Bytes, test_value: Bytes, value: Bytes },
    GetAndSet { key: Bytes, value: Bytes },
    Add { key: Bytes, delta: i64 },
    Append { key: Bytes, suffix: Bytes },
    Delete { key: Bytes },
    Remove { key: Bytes },
}

impl ShardCommand {
    fn tag(&self) -> u8 {
        match self {
            ShardCommand::Set { .. } => 0,
            ShardCommand::SetIfNotExists { .. } => 1,
            ShardCommand::TestAndSet { .. } => 2,
            ShardCommand::GetAndSet { .. } => 3,
            ShardCommand::Add { .. } => 4,
            ShardCommand::Append { .. } => 5,
            ShardCommand::Delete { .. } => 6,
            ShardCommand::Remove { .. } => 7,
        }
    }

    pub fn key(&self) -> &Bytes {
        match self {
            ShardCommand::Set { key, .. }
            | ShardCommand::SetIfNotExists { key, .. }
            | ShardCommand::TestAndSet { key, .. }
            | ShardCommand::GetAndSet { key, .. }
            | ShardCommand::Add { key, .. }
            | ShardCommand::Append { key, .. }
            | ShardCommand::Delete { key }
            | ShardCommand::Remove { key } => key,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.tag());

        fn put_blob(out: &mut BytesMut, blob: &[u8]) {
            out.put_u32(blob.len() as u32);
            out.put_slice(blob);
        }

        match self {
            ShardCommand::Set { key, value } | ShardCommand::SetIfNotExists { key, value } => {
                put_blob(&mut out, key);
                put_blob(&mut out, value);
            }
            ShardCommand::TestAndSet { key, test_value, value } => {
                put_blob(&mut out, key);
                put_blob(&mut out, test_value);
                put_blob(&mut out, value);
            }
            ShardCommand::GetAndSet { key, value } => {
                put_blob(&mut out, key);
                put_blob(&mut out, value);
            }
            ShardCommand::Add { key, delta } => {
                put_blob(&mut out, key);
                out.put_i64(*delta);
            }
            ShardCommand::Append { key, suffix } => {
                put_blob(&mut out, key);
                put_blob(&mut out, suffix);
            }
            ShardCommand::Delete { key } | ShardCommand::Remove { key } => {
                put_blob(&mut out, key);
            }
        }

        out.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        fn get_blob(bytes: &mut Bytes) -> Result<Bytes, Error> {
            if bytes.remaining() < 4 {
                return Err(Error::MalformedCommand);
            }
            let len = bytes.get_u32() as usize;
            if bytes.remaining() < len {
                return Err(Error::MalformedCommand);
            }
            Ok(bytes.split_to(len))
        }

        if bytes.remaining() < 1 {
            return Err(Error::MalformedCommand);
        }
        let tag = bytes.get_u8();

        Ok(match tag {
            0 => ShardCommand::Set {
                key: get_blob(&mut bytes)?,
                value: get_blob(&mut bytes)?,
            },
            1 => ShardCommand::SetIfNotExists {
                key: get_blob(&mut bytes)?,
                value: get_blob(&mut bytes)?,
            },
            2 => ShardCommand::TestAndSet {
                key: get_blob(&mut bytes)?,
                test_value: get_blob(&mut bytes)?,
                value: get_blob(&mut bytes)?,
            },
            3 => ShardCommand::GetAndSet {
                key: get_blob(&mut bytes)?,
                value: get_blob(&mut bytes)?,
            },
            4 => {
                let key = get_blob(&mut bytes)?;
                if bytes.remaining() < 8 {
                    return Err(Error::MalformedCommand);
                }
                ShardCommand::Add { key, delta: bytes.get_i64() }
            }
            5 => ShardCommand::Append {
                key: get_blob(&mut bytes)?,
                suffix: get_blob(&mut bytes)?,
            },
            6 => ShardCommand::Delete { key: get_blob(&mut bytes)? },
            7 => ShardCommand::Remove { key: get_blob(&mut bytes)? },
            _ => return Err(Error::MalformedCommand),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_roundtrip() {
        let cmd = ShardCommand::Set {
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
        };
        assert_eq!(ShardCommand::decode(cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn test_add_roundtrip() {
        let cmd = ShardCommand::Add {
            key: Bytes::from_static(b"counter"),
            delta: -3,
        };
        assert_eq!(ShardCommand::decode(cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn test_test_and_set_roundtrip() {
        let cmd = ShardCommand::TestAndSet {
            key: Bytes::from_static(b"k"),
            test_value: Bytes::from_static(b"old"),
            value: Bytes::from_static(b"new"),
        };
        assert_eq!(ShardCommand::decode(cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn test_truncated_input_errors() {
        assert!(ShardCommand::decode(Bytes::from_static(&[0])).is_err());
    }
}
