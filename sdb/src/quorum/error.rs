use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Paxos(#[from] crate::paxos::Error),

    #[error(transparent)]
    Net(#[from] crate::net::Error),

    #[error("log position {0} was already applied")]
    AlreadyApplied(u64),

    #[error("log position {0} is not yet chosen, cannot catch up to it")]
    NotChosen(u64),

    #[error("consumer rejected chosen value at position {0}: {1}")]
    Consumer(u64, String),
}
