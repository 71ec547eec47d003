//! `FileChunk`: an immutable on-disk sorted run, written once by the
//! background writer and read many times.
//!
//! Layout on disk: `Header -> DataPage[] -> IndexPage -> BloomPage?`,
//! each region little-endian and checksummed with `crc32c`.

use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::ids::{ChunkId, CommandId, LogSegmentId};

use super::bloom::BloomFilter;
use super::error::Error;
use super::memo::Op;

const MAGIC: &[u8; 20] = b"ScalienDB Chunk File";

#[derive(Debug, Clone)]
pub struct ChunkHeader {
    pub chunk_id: ChunkId,
    pub log_segment_id: LogSegmentId,
    pub log_command_id: CommandId,
    pub num_keys: u64,
    pub use_bloom_filter: bool,
}

struct DataPage {
    records: Vec<(Bytes, Op)>,
}

/// One sorted, immutable run of key/value (or tombstone) records, with
/// an index over its data pages and an optional Bloom filter.
pub struct FileChunk {
    pub header: ChunkHeader,
    pages: Vec<DataPage>,
    /// first key of each page, parallel to `pages`.
    index: Vec<Bytes>,
    bloom: Option<BloomFilter>,
}

impl FileChunk {
    /// Build a chunk from a sorted iterator of records, splitting into
    /// pages of at most `page_size` records apiece (a proxy for
    /// `data_page_size` bytes — good enough at the record counts this
    /// engine actually sees per chunk).
    pub fn build(
        chunk_id: ChunkId,
        log_segment_id: LogSegmentId,
        log_command_id: CommandId,
        records: Vec<(Bytes, Op)>,
        page_size: usize,
        use_bloom_filter: bool,
        bloom_threshold: u64,
    ) -> Self {
        let num_keys = records.len() as u64;
        let mut pages = Vec::new();
        let mut index = Vec::new();

        for chunk in records.chunks(page_size.max(1)) {
            index.push(chunk[0].0.clone());
            pages.push(DataPage {
                records: chunk.to_vec(),
            });
        }

        let build_bloom = use_bloom_filter && num_keys >= bloom_threshold;
        let bloom = build_bloom.then(|| {
            let mut filter = BloomFilter::for_num_keys(num_keys);
            for page in &pages {
                for (key, _) in &page.records {
                    filter.insert(key);
                }
            }
            filter
        });

        Self {
            header: ChunkHeader {
                chunk_id,
                log_segment_id,
                log_command_id,
                num_keys,
                use_bloom_filter: bloom.is_some(),
            },
            pages,
            index,
            bloom,
        }
    }

    pub fn num_keys(&self) -> u64 {
        self.header.num_keys
    }

    /// Bloom test (if present) → index binary search → data-page scan.
    pub fn get(&self, key: &[u8]) -> Option<&Op> {
        if let Some(bloom) = &self.bloom {
            if !bloom.check(key) {
                return None;
            }
        }

        let page_idx = match self.index.binary_search_by(|k| k.as_ref().cmp(key)) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };

        self.pages[page_idx]
            .records
            .binary_search_by(|(k, _)| k.as_ref().cmp(key))
            .ok()
            .map(|i| &self.pages[page_idx].records[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Op)> {
        self.pages.iter().flat_map(|p| p.records.iter().map(|(k, v)| (k, v)))
    }

    fn encode_data_pages(&self) -> Vec<(u64, u32, BytesMut)> {
        let mut out = Vec::new();
        for page in &self.pages {
            let mut body = BytesMut::new();
            body.put_u32(page.records.len() as u32);
            for (key, op) in &page.records {
                body.put_u32(key.len() as u32);
                body.put_slice(key);
                match op {
                    Op::Set(value) => {
                        body.put_u8(0);
                        body.put_u32(value.len() as u32);
                        body.put_slice(value);
                    }
                    Op::Delete => body.put_u8(1),
                }
            }
            out.push((0, 0, body));
        }
        out
    }

    pub async fn write(&self, dir: &Path) -> Result<PathBuf, Error> {
        let path = dir.join(format!("chunk.{:020}", self.header.chunk_id.0));
        let mut out = BytesMut::new();

        let data_pages = self.encode_data_pages();
        let mut data_region = BytesMut::new();
        let mut page_offsets = Vec::new();
        for (_, _, body) in &data_pages {
            let checksum = crc32c::crc32c(body);
            page_offsets.push((data_region.len() as u64, body.len() as u32));
            data_region.put_u32(body.len() as u32);
            data_region.put_u32(checksum);
            data_region.put_slice(body);
        }

        let mut index_region = BytesMut::new();
        index_region.put_u32(self.index.len() as u32);
        for (key, (offset, len)) in self.index.iter().zip(page_offsets.iter()) {
            index_region.put_u32(key.len() as u32);
            index_region.put_slice(key);
            index_region.put_u64(*offset);
            index_region.put_u32(*len);
        }
        let index_checksum = crc32c::crc32c(&index_region);

        let bloom_region = self.bloom.as_ref().map(|b| {
            let bytes = b.as_bytes().to_vec();
            let checksum = crc32c::crc32c(&bytes);
            (checksum, bytes)
        });

        out.put_slice(MAGIC);
        out.put_u32(1); // version
        out.put_u64(self.header.chunk_id.0);
        out.put_u64(self.header.log_segment_id.0);
        out.put_u64(self.header.log_command_id.0);
        out.put_u8(self.header.use_bloom_filter as u8);
        out.put_u64(self.header.num_keys);
        out.put_u32(data_region.len() as u32);
        out.put_slice(&data_region);
        out.put_u32(index_region.len() as u32);
        out.put_u32(index_checksum);
        out.put_slice(&index_region);
        match &bloom_region {
            Some((checksum, bytes)) => {
                out.put_u32(bytes.len() as u32);
                out.put_u32(*checksum);
                out.put_slice(bytes);
            }
            None => out.put_u32(0),
        }

        let header_checksum = crc32c::crc32c(&out);
        let mut framed = BytesMut::with_capacity(out.len() + 4);
        framed.put_u32(header_checksum);
        framed.put_slice(&out);

        let mut file = File::create(&path).await?;
        file.write_all(&framed).await?;
        file.sync_all().await?;

        Ok(path)
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        let mut bytes = Bytes::from(buf);

        if bytes.remaining() < 4 {
            return Err(Error::Truncated("chunk header checksum"));
        }
        let stored_checksum = bytes.get_u32();
        if crc32c::crc32c(&bytes) != stored_checksum {
            return Err(Error::ChunkChecksumMismatch(0, "header"));
        }

        if bytes.remaining() < MAGIC.len() {
            return Err(Error::Truncated("chunk magic"));
        }
        let magic = bytes.split_to(MAGIC.len());
        if &magic[..] != &MAGIC[..] {
            return Err(Error::Truncated("chunk magic"));
        }

        let _version = bytes.get_u32();
        let chunk_id = ChunkId(bytes.get_u64());
        let log_segment_id = LogSegmentId(bytes.get_u64());
        let log_command_id = CommandId(bytes.get_u64());
        let use_bloom_filter = bytes.get_u8() != 0;
        let num_keys = bytes.get_u64();

        let data_len = bytes.get_u32() as usize;
        let mut data_region = bytes.split_to(data_len);

        let index_len = bytes.get_u32() as usize;
        let index_checksum = bytes.get_u32();
        let index_region = bytes.split_to(index_len);
        if crc32c::crc32c(&index_region) != index_checksum {
            return Err(Error::ChunkChecksumMismatch(chunk_id.0, "index"));
        }

        let mut pages = Vec::new();
        while data_region.remaining() >= 8 {
            let page_len = data_region.get_u32() as usize;
            let page_checksum = data_region.get_u32();
            let page_body = data_region.split_to(page_len);
            if crc32c::crc32c(&page_body) != page_checksum {
                return Err(Error::ChunkChecksumMismatch(chunk_id.0, "data"));
            }
            pages.push(decode_data_page(page_body));
        }

        let mut index_cursor = index_region;
        let num_index_entries = index_cursor.get_u32();
        let mut index = Vec::new();
        for _ in 0..num_index_entries {
            let key_len = index_cursor.get_u32() as usize;
            let key = index_cursor.split_to(key_len);
            let _offset = index_cursor.get_u64();
            let _len = index_cursor.get_u32();
            index.push(key);
        }

        let bloom_len = bytes.get_u32() as usize;
        let bloom = if bloom_len > 0 {
            let bloom_checksum = bytes.get_u32();
            let bloom_bytes = bytes.split_to(bloom_len);
            if crc32c::crc32c(&bloom_bytes) != bloom_checksum {
                return Err(Error::ChunkChecksumMismatch(chunk_id.0, "bloom"));
            }
            Some(BloomFilter::from_bytes(bloom_bytes.to_vec()))
        } else {
            None
        };

        Ok(Self {
            header: ChunkHeader {
                chunk_id,
                log_segment_id,
                log_command_id,
                num_keys,
                use_bloom_filter,
            },
            pages,
            index,
            bloom,
        })
    }
}

fn decode_data_page(mut body: Bytes) -> DataPage {
    let num_records = body.get_u32();
    let mut records = Vec::with_capacity(num_records as usize);
    for _ in 0..num_records {
        let key_len = body.get_u32() as usize;
        let key = body.split_to(key_len);
        let tag = body.get_u8();
        let op = if tag == 0 {
            let value_len = body.get_u32() as usize;
            Op::Set(body.split_to(value_len))
        } else {
            Op::Delete
        };
        records.push((key, op));
    }
    DataPage { records }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_records(n: usize) -> Vec<(Bytes, Op)> {
        (0..n)
            .map(|i| {
                (
                    Bytes::from(format!("k{i:05}")),
                    Op::Set(Bytes::from(format!("v{i}"))),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_build_write_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = FileChunk::build(
            ChunkId(1),
            LogSegmentId(1),
            CommandId(100),
            sample_records(50),
            10,
            true,
            1,
        );

        let path = chunk.write(dir.path()).await.unwrap();
        let loaded = FileChunk::load(&path).await.unwrap();

        assert_eq!(loaded.num_keys(), 50);
        assert_eq!(loaded.get(b"k00007"), Some(&Op::Set(Bytes::from_static(b"v7"))));
        assert_eq!(loaded.get(b"missing"), None);
    }

    #[tokio::test]
    async fn test_below_bloom_threshold_has_no_bloom() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = FileChunk::build(
            ChunkId(2),
            LogSegmentId(1),
            CommandId(1),
            sample_records(5),
            10,
            true,
            1_000,
        );
        assert!(!chunk.header.use_bloom_filter);

        let path = chunk.write(dir.path()).await.unwrap();
        let loaded = FileChunk::load(&path).await.unwrap();
        assert_eq!(loaded.get(b"k00003"), Some(&Op::Set(Bytes::from_static(b"v3"))));
    }

    #[tokio::test]
    async fn test_corrupted_file_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = FileChunk::build(
            ChunkId(3),
            LogSegmentId(1),
            CommandId(1),
            sample_records(5),
            10,
            false,
            1,
        );
        let path = chunk.write(dir.path()).await.unwrap();

        let mut bytes = tokio::fs::read(&path).await.unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        tokio::fs::write(&path, bytes).await.unwrap();

        let err = FileChunk::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::ChunkChecksumMismatch(_, "bloom" | "data" | "header" | "index")));
    }
}
