//! Proposer role: drives one single-decree Paxos round to completion
//! against a fixed set of acceptors, transport-agnostic behind
//! [`PaxosTransport`] so `crate::quorum::Context` can wire it to the
//! cluster protocol without this module knowing about sockets.

use bytes::Bytes;

use crate::ids::{IdGenerator, NodeId, ProposalId};

use super::error::Error;
use super::message::PaxosMessage;

/// Sends a Paxos message to one peer acceptor and returns its
/// response. Implemented over `crate::net::cluster` by the quorum
/// layer; a channel-backed fake stands in for it in tests.
#[async_trait::async_trait]
pub trait PaxosTransport: Send + Sync {
    async fn send(&self, peer: NodeId, message: PaxosMessage) -> Result<PaxosMessage, Error>;
}

fn majority(quorum_size: usize) -> usize {
    quorum_size / 2 + 1
}

/// Drives Phase 1 (prepare/promise) and Phase 2 (propose/accept) of a
/// single Paxos round for one replicated log position.
pub struct PaxosInstance {
    proposal_ids: IdGenerator,
}

impl PaxosInstance {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            proposal_ids: IdGenerator::new(node_id.0),
        }
    }

    /// Run a full round: prepare against `peers`, adopt the highest
    /// previously-accepted value if a majority reports one, otherwise
    /// propose `value`; then run the accept phase. Returns the value
    /// that was actually chosen (which may differ from `value` if an
    /// earlier round's value was recovered during Phase 1).
    pub async fn propose<T: PaxosTransport>(
        &self,
        transport: &T,
        peers: &[NodeId],
        value: Bytes,
    ) -> Result<Bytes, Error> {
        let quorum_size = peers.len() + 1;
        let needed = majority(quorum_size);
        let proposal_id = ProposalId(self.proposal_ids.next().await);

        let mut promises = 1usize;
        let mut highest_accepted: Option<(ProposalId, Bytes)> = None;

        for &peer in peers {
            let response = transport
                .send(peer, PaxosMessage::PrepareRequest { proposal_id })
                .await?;

            let PaxosMessage::PrepareResponse {
                promised,
                accepted_proposal_id,
                accepted_value,
                ..
            } = response
            else {
                continue;
            };

            if !promised {
                continue;
            }
            promises += 1;

            if let (Some(accepted_id), Some(accepted_val)) =
                (accepted_proposal_id, accepted_value)
            {
                let is_higher = highest_accepted
                    .as_ref()
                    .is_none_or(|(current, _)| accepted_id > *current);
                if is_higher {
                    highest_accepted = Some((accepted_id, accepted_val));
                }
            }
        }

        if promises < needed {
            return Err(Error::QuorumUnreachable);
        }

        let chosen_value = highest_accepted
            .map(|(_, v)| v)
            .unwrap_or(value);

        let mut accepts = 1usize;
        for &peer in peers {
            let response = transport
                .send(
                    peer,
                    PaxosMessage::ProposeRequest {
                        proposal_id,
                        value: chosen_value.clone(),
                    },
                )
                .await?;

            if let PaxosMessage::ProposeResponse { accepted, .. } = response {
                if accepted {
                    accepts += 1;
                }
            }
        }

        if accepts < needed {
            return Err(Error::QuorumUnreachable);
        }

        Ok(chosen_value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::paxos::acceptor::AcceptorState;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct FakeTransport {
        acceptors: HashMap<NodeId, Mutex<AcceptorState>>,
    }

    impl FakeTransport {
        fn new(peers: &[NodeId]) -> Self {
            Self {
                acceptors: peers
                    .iter()
                    .map(|&p| (p, Mutex::new(AcceptorState::default())))
                    .collect(),
            }
        }
    }

    #[async_trait::async_trait]
    impl PaxosTransport for FakeTransport {
        async fn send(&self, peer: NodeId, message: PaxosMessage) -> Result<PaxosMessage, Error> {
            let mut acceptor = self.acceptors.get(&peer).unwrap().lock();
            Ok(match message {
                PaxosMessage::PrepareRequest { proposal_id } => {
                    acceptor.handle_prepare(proposal_id)
                }
                PaxosMessage::ProposeRequest { proposal_id, value } => {
                    acceptor.handle_propose(proposal_id, value)
                }
                other => other,
            })
        }
    }

    #[tokio::test]
    async fn test_single_proposer_reaches_majority_and_chooses_value() {
        let peers = vec![NodeId(2), NodeId(3)];
        let transport = FakeTransport::new(&peers);
        let instance = PaxosInstance::new(NodeId(1));

        let chosen = instance
            .propose(&transport, &peers, Bytes::from_static(b"first"))
            .await
            .unwrap();
        assert_eq!(chosen, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn test_second_round_adopts_previously_accepted_value() {
        let peers = vec![NodeId(2), NodeId(3)];
        let transport = FakeTransport::new(&peers);

        let first = PaxosInstance::new(NodeId(1));
        first
            .propose(&transport, &peers, Bytes::from_static(b"first"))
            .await
            .unwrap();

        let second = PaxosInstance::new(NodeId(4));
        let chosen = second
            .propose(&transport, &peers, Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert_eq!(chosen, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn test_stale_proposal_fails_to_reach_majority() {
        let peers = vec![NodeId(2), NodeId(3)];
        let transport = FakeTransport::new(&peers);

        for &peer in &peers {
            transport
                .send(
                    peer,
                    PaxosMessage::PrepareRequest {
                        proposal_id: ProposalId(u64::MAX),
                    },
                )
                .await
                .unwrap();
        }

        let instance = PaxosInstance::new(NodeId(1));
        let err = instance
            .propose(&transport, &peers, Bytes::from_static(b"v"))
            .await
            .unwrap_err();
        assert_eq!(err, Error::QuorumUnreachable);
    }
}
