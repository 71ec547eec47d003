use thiserror::Error;

use crate::ids::ProposalId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("acceptor did not promise proposal {0:?}")]
    NotPromised(ProposalId),

    #[error("proposal {0:?} is stale, a higher proposal was already seen")]
    StaleProposal(ProposalId),

    #[error("could not reach a majority of the quorum")]
    QuorumUnreachable,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("acceptor store error: {0}")]
    Store(String),
}
