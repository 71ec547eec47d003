//! Paxos message taxonomy, carried opaque inside
//! `crate::net::cluster::ClusterMessage::Paxos` (tag `P:`).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ids::ProposalId;

use super::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaxosMessage {
    PrepareRequest {
        proposal_id: ProposalId,
    },
    PrepareResponse {
        proposal_id: ProposalId,
        promised: bool,
        accepted_proposal_id: Option<ProposalId>,
        accepted_value: Option<Bytes>,
    },
    ProposeRequest {
        proposal_id: ProposalId,
        value: Bytes,
    },
    ProposeResponse {
        proposal_id: ProposalId,
        accepted: bool,
    },
    /// Sent by the proposer once it has learned a value was chosen, so
    /// acceptors can fast-forward without waiting for another round.
    LearnChosen {
        proposal_id: ProposalId,
        value: Bytes,
    },
}

impl PaxosMessage {
    fn tag(&self) -> u8 {
        match self {
            PaxosMessage::PrepareRequest { .. } => 0,
            PaxosMessage::PrepareResponse { .. } => 1,
            PaxosMessage::ProposeRequest { .. } => 2,
            PaxosMessage::ProposeResponse { .. } => 3,
            PaxosMessage::LearnChosen { .. } => 4,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(self.tag());

        match self {
            PaxosMessage::PrepareRequest { proposal_id } => out.put_u64(proposal_id.0),
            PaxosMessage::PrepareResponse {
                proposal_id,
                promised,
                accepted_proposal_id,
                accepted_value,
            } => {
                out.put_u64(proposal_id.0);
                out.put_u8(*promised as u8);
                out.put_u64(accepted_proposal_id.map(|p| p.0).unwrap_or(0));
                let value = accepted_value.as_deref().unwrap_or_default();
                out.put_u32(value.len() as u32);
                out.put_slice(value);
            }
            PaxosMessage::ProposeRequest { proposal_id, value } => {
                out.put_u64(proposal_id.0);
                out.put_u32(value.len() as u32);
                out.put_slice(value);
            }
            PaxosMessage::ProposeResponse {
                proposal_id,
                accepted,
            } => {
                out.put_u64(proposal_id.0);
                out.put_u8(*accepted as u8);
            }
            PaxosMessage::LearnChosen { proposal_id, value } => {
                out.put_u64(proposal_id.0);
                out.put_u32(value.len() as u32);
                out.put_slice(value);
            }
        }

        out.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, Error> {
        if bytes.remaining() < 1 {
            return Err(Error::Transport("empty paxos message".into()));
        }
        let tag = bytes.get_u8();

        Ok(match tag {
            0 => PaxosMessage::PrepareRequest {
                proposal_id: ProposalId(bytes.get_u64()),
            },
            1 => {
                let proposal_id = ProposalId(bytes.get_u64());
                let promised = bytes.get_u8() != 0;
                let accepted_raw = bytes.get_u64();
                let accepted_proposal_id = (accepted_raw != 0).then_some(ProposalId(accepted_raw));
                let len = bytes.get_u32() as usize;
                let value_bytes = bytes.split_to(len);
                let accepted_value = (!value_bytes.is_empty()).then_some(value_bytes);
                PaxosMessage::PrepareResponse {
                    proposal_id,
                    promised,
                    accepted_proposal_id,
                    accepted_value,
                }
            }
            2 => {
                let proposal_id = ProposalId(bytes.get_u64());
                let len = bytes.get_u32() as usize;
                let value = bytes.split_to(len);
                PaxosMessage::ProposeRequest { proposal_id, value }
            }
            3 => PaxosMessage::ProposeResponse {
                proposal_id: ProposalId(bytes.get_u64()),
                accepted: bytes.get_u8() != 0,
            },
            4 => {
                let proposal_id = ProposalId(bytes.get_u64());
                let len = bytes.get_u32() as usize;
                let value = bytes.split_to(len);
                PaxosMessage::LearnChosen { proposal_id, value }
            }
            other => return Err(Error::Transport(format!("unknown paxos tag {other}"))),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prepare_request_roundtrip() {
        let msg = PaxosMessage::PrepareRequest {
            proposal_id: ProposalId(7),
        };
        assert_eq!(PaxosMessage::decode(msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_prepare_response_with_accepted_value_roundtrip() {
        let msg = PaxosMessage::PrepareResponse {
            proposal_id: ProposalId(9),
            promised: true,
            accepted_proposal_id: Some(ProposalId(3)),
            accepted_value: Some(Bytes::from_static(b"chosen-value")),
        };
        assert_eq!(PaxosMessage::decode(msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_prepare_response_without_prior_accept_roundtrip() {
        let msg = PaxosMessage::PrepareResponse {
            proposal_id: ProposalId(9),
            promised: true,
            accepted_proposal_id: None,
            accepted_value: None,
        };
        assert_eq!(PaxosMessage::decode(msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_propose_roundtrip() {
        let msg = PaxosMessage::ProposeRequest {
            proposal_id: ProposalId(1),
            value: Bytes::from_static(b"v"),
        };
        assert_eq!(PaxosMessage::decode(msg.encode()).unwrap(), msg);
    }
}
