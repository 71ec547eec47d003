//! Cluster (inter-node) protocol: tag-dispatched messages exchanged
//! between shard servers, controllers, and quorum peers.
//!
//! Paxos and PaxosLease sub-protocols are framed inside quorum
//! transports with a leading `P:`/`L:` tag and carried here as opaque
//! payloads ([`ClusterMessage::Paxos`]/[`ClusterMessage::Lease`]); the
//! quorum transport (`crate::quorum::transport`) decodes their contents
//! with `crate::paxos::message`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ids::NodeId;
use crate::net::error::Error;
use crate::net::frame::{read_blob, write_blob};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterMessage {
    SetNodeId(NodeId),
    Heartbeat { node_id: NodeId, expire_at_ms: u64 },
    SetConfigState(Bytes),
    RequestLease { node_id: NodeId },
    ReceiveLease { node_id: NodeId, expire_at_ms: u64 },
    ShardMigrationInitiate { src_shard: u64, dst_shard: u64 },
    ShardMigrationBegin { dst_shard: u64 },
    ShardMigrationSet { dst_shard: u64, key: Bytes, value: Bytes },
    ShardMigrationDelete { dst_shard: u64, key: Bytes },
    ShardMigrationCommit { dst_shard: u64 },
    ShardMigrationPause { dst_shard: u64 },
    ShardMigrationResume { dst_shard: u64 },
    /// Opaque Paxos sub-protocol payload, tagged `P:`.
    Paxos(Bytes),
    /// Opaque PaxosLease sub-protocol payload, tagged `L:`.
    Lease(Bytes),
}

impl ClusterMessage {
    fn wire_tag(&self) -> &'static str {
        use ClusterMessage::*;
        match self {
            SetNodeId(_) => "SET_NODEID",
            Heartbeat { .. } => "HEARTBEAT",
            SetConfigState(_) => "SET_CONFIG_STATE",
            RequestLease { .. } => "REQUEST_LEASE",
            ReceiveLease { .. } => "RECEIVE_LEASE",
            ShardMigrationInitiate { .. } => "SHARDMIGRATION_INITIATE",
            ShardMigrationBegin { .. } => "SHARDMIGRATION_BEGIN",
            ShardMigrationSet { .. } => "SHARDMIGRATION_SET",
            ShardMigrationDelete { .. } => "SHARDMIGRATION_DELETE",
            ShardMigrationCommit { .. } => "SHARDMIGRATION_COMMIT",
            ShardMigrationPause { .. } => "SHARDMIGRATION_PAUSE",
            ShardMigrationResume { .. } => "SHARDMIGRATION_RESUME",
            Paxos(_) => "P",
            Lease(_) => "L",
        }
    }

    pub fn encode(&self) -> Bytes {
        use ClusterMessage::*;

        let mut out = BytesMut::new();
        write_blob(&mut out, self.wire_tag().as_bytes());

        match self {
            SetNodeId(id) => out.put_u64(id.0),
            Heartbeat { node_id, expire_at_ms } => {
                out.put_u64(node_id.0);
                out.put_u64(*expire_at_ms);
            }
            SetConfigState(bytes) => write_blob(&mut out, bytes),
            RequestLease { node_id } => out.put_u64(node_id.0),
            ReceiveLease { node_id, expire_at_ms } => {
                out.put_u64(node_id.0);
                out.put_u64(*expire_at_ms);
            }
            ShardMigrationInitiate { src_shard, dst_shard } => {
                out.put_u64(*src_shard);
                out.put_u64(*dst_shard);
            }
            ShardMigrationBegin { dst_shard }
            | ShardMigrationCommit { dst_shard }
            | ShardMigrationPause { dst_shard }
            | ShardMigrationResume { dst_shard } => out.put_u64(*dst_shard),
            ShardMigrationSet { dst_shard, key, value } => {
                out.put_u64(*dst_shard);
                write_blob(&mut out, key);
                write_blob(&mut out, value);
            }
            ShardMigrationDelete { dst_shard, key } => {
                out.put_u64(*dst_shard);
                write_blob(&mut out, key);
            }
            Paxos(bytes) | Lease(bytes) => write_blob(&mut out, bytes),
        }

        out.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        let tag = read_blob(&mut bytes)?;
        let tag = std::str::from_utf8(&tag)
            .map_err(|_| Error::UnknownClusterTag("<invalid utf8>".into()))?;

        Ok(match tag {
            "SET_NODEID" => ClusterMessage::SetNodeId(NodeId(bytes.get_u64())),
            "HEARTBEAT" => ClusterMessage::Heartbeat {
                node_id: NodeId(bytes.get_u64()),
                expire_at_ms: bytes.get_u64(),
            },
            "SET_CONFIG_STATE" => ClusterMessage::SetConfigState(read_blob(&mut bytes)?),
            "REQUEST_LEASE" => ClusterMessage::RequestLease {
                node_id: NodeId(bytes.get_u64()),
            },
            "RECEIVE_LEASE" => ClusterMessage::ReceiveLease {
                node_id: NodeId(bytes.get_u64()),
                expire_at_ms: bytes.get_u64(),
            },
            "SHARDMIGRATION_INITIATE" => ClusterMessage::ShardMigrationInitiate {
                src_shard: bytes.get_u64(),
                dst_shard: bytes.get_u64(),
            },
            "SHARDMIGRATION_BEGIN" => ClusterMessage::ShardMigrationBegin {
                dst_shard: bytes.get_u64(),
            },
            "SHARDMIGRATION_SET" => ClusterMessage::ShardMigrationSet {
                dst_shard: bytes.get_u64(),
                key: read_blob(&mut bytes)?,
                value: read_blob(&mut bytes)?,
            },
            "SHARDMIGRATION_DELETE" => ClusterMessage::ShardMigrationDelete {
                dst_shard: bytes.get_u64(),
                key: read_blob(&mut bytes)?,
            },
            "SHARDMIGRATION_COMMIT" => ClusterMessage::ShardMigrationCommit {
                dst_shard: bytes.get_u64(),
            },
            "SHARDMIGRATION_PAUSE" => ClusterMessage::ShardMigrationPause {
                dst_shard: bytes.get_u64(),
            },
            "SHARDMIGRATION_RESUME" => ClusterMessage::ShardMigrationResume {
                dst_shard: bytes.get_u64(),
            },
            "P" => ClusterMessage::Paxos(read_blob(&mut bytes)?),
            "L" => ClusterMessage::Lease(read_blob(&mut bytes)?),
            other => return Err(Error::UnknownClusterTag(other.to_string())),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_heartbeat_roundtrip() {
        let msg = ClusterMessage::Heartbeat {
            node_id: NodeId(3),
            expire_at_ms: 123_456,
        };
        let decoded = ClusterMessage::decode(msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_shard_migration_set_roundtrip() {
        let msg = ClusterMessage::ShardMigrationSet {
            dst_shard: 9,
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
        };
        let decoded = ClusterMessage::decode(msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_paxos_payload_roundtrip() {
        let msg = ClusterMessage::Paxos(Bytes::from_static(b"PREPARE_REQUEST:5"));
        let decoded = ClusterMessage::decode(msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_unknown_tag_errors() {
        let mut out = BytesMut::new();
        write_blob(&mut out, b"NOT_A_TAG");
        let err = ClusterMessage::decode(out.freeze()).unwrap_err();
        assert!(matches!(err, Error::UnknownClusterTag(_)));
    }
}
