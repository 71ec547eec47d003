//! `LogSegment`: an append-only, fsynced write-ahead log. Every command
//! applied to a shard's active [`crate::storage::memo::MemoChunk`] is
//! durable here first.

use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::ids::{CommandId, LogSegmentId};

use super::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOp {
    Set { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub command_id: CommandId,
    pub op: RecordOp,
}

impl Record {
    fn encode_body(&self) -> BytesMut {
        let mut body = BytesMut::new();
        body.put_u64(self.command_id.0);
        match &self.op {
            RecordOp::Set { key, value } => {
                body.put_u8(0);
                body.put_u32(key.len() as u32);
                body.put_slice(key);
                body.put_u32(value.len() as u32);
                body.put_slice(value);
            }
            RecordOp::Delete { key } => {
                body.put_u8(1);
                body.put_u32(key.len() as u32);
                body.put_slice(key);
            }
        }
        body
    }

    fn decode_body(mut body: Bytes) -> Option<Self> {
        if body.remaining() < 9 {
            return None;
        }
        let command_id = CommandId(body.get_u64());
        let tag = body.get_u8();
        let op = match tag {
            0 => {
                let key_len = body.get_u32() as usize;
                if body.remaining() < key_len + 4 {
                    return None;
                }
                let key = body.split_to(key_len);
                let value_len = body.get_u32() as usize;
                if body.remaining() < value_len {
                    return None;
                }
                let value = body.split_to(value_len);
                RecordOp::Set { key, value }
            }
            1 => {
                let key_len = body.get_u32() as usize;
                if body.remaining() < key_len {
                    return None;
                }
                let key = body.split_to(key_len);
                RecordOp::Delete { key }
            }
            _ => return None,
        };
        Some(Self { command_id, op })
    }
}

/// One on-disk WAL file, identified by [`LogSegmentId`].
pub struct LogSegment {
    id: LogSegmentId,
    path: PathBuf,
    file: File,
}

impl LogSegment {
    pub async fn create(dir: &Path, id: LogSegmentId) -> Result<Self, Error> {
        let path = dir.join(format!("log.{:020}", id.0));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { id, path, file })
    }

    pub fn id(&self) -> LogSegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and fsync before returning, so callers may
    /// acknowledge the write once this resolves.
    pub async fn append(&mut self, record: &Record) -> Result<(), Error> {
        let body = record.encode_body();
        let checksum = crc32c::crc32c(&body);

        let mut frame = BytesMut::with_capacity(8 + body.len());
        frame.put_u32(body.len() as u32);
        frame.put_slice(&body);
        frame.put_u32(checksum);

        self.file.write_all(&frame).await?;
        self.file.sync_all().await?;
        Ok(())
    }

    /// Replay every well-formed record in `path`, in order. Stops
    /// silently at the first truncated or checksum-mismatched record
    /// (an interrupted final write) rather than failing recovery.
    pub async fn replay(path: &Path) -> Result<Vec<Record>, Error> {
        let mut file = match File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        let mut cursor = Bytes::from(buf);
        let mut records = Vec::new();

        loop {
            if cursor.remaining() < 4 {
                break;
            }
            let mut peek = cursor.clone();
            let body_len = peek.get_u32() as usize;
            if peek.remaining() < body_len + 4 {
                break;
            }

            let body = peek.split_to(body_len);
            let stored_checksum = peek.get_u32();
            if crc32c::crc32c(&body) != stored_checksum {
                break;
            }

            let Some(record) = Record::decode_body(body) else {
                break;
            };
            records.push(record);
            cursor = peek;
        }

        Ok(records)
    }
}
