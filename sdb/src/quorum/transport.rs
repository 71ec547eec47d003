//! Maps [`PaxosTransport`] onto the real cluster protocol: one
//! short-lived TCP connection per request, carrying a
//! `ClusterMessage::Paxos` payload.
//!
//! Connecting per-call keeps this simple; a shard quorum under real
//! load will want connection reuse instead, tracked as a follow-up.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::ids::NodeId;
use crate::net::cluster::ClusterMessage;
use crate::net::frame::Frame;
use crate::net::stream::Stream;
use crate::paxos::error::Error as PaxosError;
use crate::paxos::{PaxosMessage, PaxosTransport};

/// Resolves peer node IDs to `host:port` endpoints and speaks the
/// cluster protocol to them.
#[derive(Debug, Default)]
pub struct ClusterTransport {
    endpoints: RwLock<HashMap<NodeId, String>>,
}

impl ClusterTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_endpoint(&self, node_id: NodeId, endpoint: String) {
        self.endpoints.write().insert(node_id, endpoint);
    }

    pub fn endpoint_of(&self, node_id: NodeId) -> Option<String> {
        self.endpoints.read().get(&node_id).cloned()
    }
}

#[async_trait::async_trait]
impl PaxosTransport for ClusterTransport {
    async fn send(&self, peer: NodeId, message: PaxosMessage) -> Result<PaxosMessage, PaxosError> {
        let endpoint = self
            .endpoint_of(peer)
            .ok_or_else(|| PaxosError::Transport(format!("no endpoint for node {peer}")))?;

        let mut stream = Stream::connect(&endpoint)
            .await
            .map_err(|e| PaxosError::Transport(e.to_string()))?;

        let outgoing = ClusterMessage::Paxos(message.encode()).encode();
        Frame::write(&mut stream, &outgoing)
            .await
            .map_err(|e| PaxosError::Transport(e.to_string()))?;

        let incoming = Frame::read(&mut stream)
            .await
            .map_err(|e| PaxosError::Transport(e.to_string()))?;

        match ClusterMessage::decode(incoming).map_err(|e| PaxosError::Transport(e.to_string()))? {
            ClusterMessage::Paxos(payload) => PaxosMessage::decode(payload),
            other => Err(PaxosError::Transport(format!(
                "expected a Paxos cluster message, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unknown_endpoint_errors_without_connecting() {
        let transport = ClusterTransport::new();
        assert_eq!(transport.endpoint_of(NodeId(1)), None);
    }

    #[test]
    fn test_set_and_resolve_endpoint() {
        let transport = ClusterTransport::new();
        transport.set_endpoint(NodeId(1), "127.0.0.1:7090".into());
        assert_eq!(transport.endpoint_of(NodeId(1)).as_deref(), Some("127.0.0.1:7090"));
    }
}
