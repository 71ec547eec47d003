//! Backs `crate::paxos::AcceptorStore` with a reserved-key range in an
//! [`Environment`] — acceptor state lives in the same chunk storage as
//! ordinary keys instead of a separate file format.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ids::ProposalId;
use crate::paxos::acceptor::{AcceptorState, AcceptorStore};
use crate::paxos::error::Error as PaxosError;

use super::environment::Environment;

/// Keys in this range are never visible to `crate::net::message`
/// clients; `crate::shard` must reject user keys with this prefix.
pub const ACCEPTOR_KEY_PREFIX: &[u8] = b"\0sys:acceptor:";

fn acceptor_key(log_position: u64) -> Bytes {
    let mut key = BytesMut::from(ACCEPTOR_KEY_PREFIX);
    key.put_u64(log_position);
    key.freeze()
}

fn encode_state(state: &AcceptorState) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u64(state.promised_proposal_id.map(|p| p.0).unwrap_or(0));
    out.put_u64(state.accepted_proposal_id.map(|p| p.0).unwrap_or(0));
    let value = state.accepted_value.as_deref().unwrap_or_default();
    out.put_u32(value.len() as u32);
    out.put_slice(value);
    out.freeze()
}

fn decode_state(mut bytes: Bytes) -> AcceptorState {
    let promised = bytes.get_u64();
    let accepted = bytes.get_u64();
    let value_len = bytes.get_u32() as usize;
    let value = bytes.split_to(value_len);

    AcceptorState {
        promised_proposal_id: (promised != 0).then_some(ProposalId(promised)),
        accepted_proposal_id: (accepted != 0).then_some(ProposalId(accepted)),
        accepted_value: (!value.is_empty()).then_some(value),
    }
}

#[async_trait::async_trait]
impl AcceptorStore for Environment {
    async fn load(&self, log_position: u64) -> Result<AcceptorState, PaxosError> {
        match self.get(&acceptor_key(log_position)).await {
            Some(bytes) => Ok(decode_state(bytes)),
            None => Ok(AcceptorState::default()),
        }
    }

    async fn save(&self, log_position: u64, state: &AcceptorState) -> Result<(), PaxosError> {
        self.set(acceptor_key(log_position), encode_state(state))
            .await
            .map_err(|e| PaxosError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::ShardId;
    use sdb_config::General;

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::open(dir.path().to_path_buf(), ShardId(1), General::default())
            .await
            .unwrap();

        let state = AcceptorState {
            promised_proposal_id: Some(ProposalId(5)),
            accepted_proposal_id: Some(ProposalId(5)),
            accepted_value: Some(Bytes::from_static(b"chosen")),
        };
        env.save(0, &state).await.unwrap();

        let loaded = env.load(0).await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_load_unknown_position_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::open(dir.path().to_path_buf(), ShardId(1), General::default())
            .await
            .unwrap();
        assert_eq!(env.load(99).await.unwrap(), AcceptorState::default());
    }
}
