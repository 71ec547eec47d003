//! Acceptor role: the passive side of a Paxos round. State is small
//! enough to persist as a single row per log position in the storage
//! layer's system table — see [`AcceptorStore`], implemented by
//! `crate::storage::Environment`.

use bytes::Bytes;

use crate::ids::ProposalId;

use super::error::Error;
use super::message::PaxosMessage;

/// The durable half of an acceptor's state: everything that must
/// survive a crash for safety to hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptorState {
    pub promised_proposal_id: Option<ProposalId>,
    pub accepted_proposal_id: Option<ProposalId>,
    pub accepted_value: Option<Bytes>,
}

impl AcceptorState {
    /// Phase 1b. Promise a proposal iff it is higher than anything
    /// already promised; report back the highest value accepted so
    /// far so the proposer can safely adopt it.
    pub fn handle_prepare(&mut self, proposal_id: ProposalId) -> PaxosMessage {
        let promised = self.promised_proposal_id.is_none_or(|p| proposal_id > p);
        if promised {
            self.promised_proposal_id = Some(proposal_id);
        }

        PaxosMessage::PrepareResponse {
            proposal_id,
            promised,
            accepted_proposal_id: self.accepted_proposal_id,
            accepted_value: self.accepted_value.clone(),
        }
    }

    /// Phase 2b. Accept a value iff it does not violate an
    /// already-issued promise for a higher proposal.
    pub fn handle_propose(&mut self, proposal_id: ProposalId, value: Bytes) -> PaxosMessage {
        let accepted = self.promised_proposal_id.is_none_or(|p| proposal_id >= p);
        if accepted {
            self.promised_proposal_id = Some(proposal_id);
            self.accepted_proposal_id = Some(proposal_id);
            self.accepted_value = Some(value);
        }

        PaxosMessage::ProposeResponse {
            proposal_id,
            accepted,
        }
    }
}

/// Durable acceptor state keyed by replicated log position, backed by
/// a storage-layer system table.
#[async_trait::async_trait]
pub trait AcceptorStore: Send + Sync {
    async fn load(&self, log_position: u64) -> Result<AcceptorState, Error>;
    async fn save(&self, log_position: u64, state: &AcceptorState) -> Result<(), Error>;
}
