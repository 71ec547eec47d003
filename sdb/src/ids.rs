//! Newtype 64-bit identifiers and the monotonic generator that mints
//! them.
//!
//! The generator packs `(timestamp_ms, node_id, sequence)` into a single
//! `u64`: monotonic within a node, globally unique across nodes as long
//! as each node has a distinct, small `node_id`. Paxos `ProposalID`s
//! need exactly this property (unique, and comparable with `>`), and
//! client `CommandID`s need it to be monotonic per client.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio::time::sleep;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

id_type!(NodeId);
id_type!(QuorumId);
id_type!(DatabaseId);
id_type!(TableId);
id_type!(ShardId);
id_type!(PaxosId);
id_type!(ProposalId);
id_type!(CommandId);
id_type!(RunId);
id_type!(ChunkId);
id_type!(LogSegmentId);

const NODE_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const TIMESTAMP_BITS: u64 = 41;
const MAX_NODE_ID: u64 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;
const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;
const SDB_EPOCH_MS: u64 = 1_700_000_000_000;
const NODE_SHIFT: u8 = SEQUENCE_BITS as u8;
const TIMESTAMP_SHIFT: u8 = (SEQUENCE_BITS + NODE_BITS) as u8;

#[derive(Debug, Default)]
struct State {
    last_timestamp_ms: u64,
    sequence: u64,
}

impl State {
    async fn next(&mut self, node_id: u64) -> u64 {
        let mut now = wait_until(self.last_timestamp_ms).await;

        if now == self.last_timestamp_ms {
            self.sequence = (self.sequence + 1) & MAX_SEQUENCE;
            if self.sequence == 0 {
                now = wait_until(now + 1).await;
            }
        } else {
            self.sequence = 0;
        }

        self.last_timestamp_ms = now;

        let elapsed = self.last_timestamp_ms.saturating_sub(SDB_EPOCH_MS);
        assert!(
            elapsed <= MAX_TIMESTAMP,
            "id generator timestamp overflow: {elapsed} > {MAX_TIMESTAMP}"
        );

        ((elapsed & MAX_TIMESTAMP) << TIMESTAMP_SHIFT)
            | ((node_id & MAX_NODE_ID) << NODE_SHIFT)
            | self.sequence
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("SystemTime is before UNIX_EPOCH")
        .as_millis() as u64
}

async fn wait_until(target_ms: u64) -> u64 {
    loop {
        let now = now_ms();
        if now >= target_ms {
            return now;
        }
        sleep(Duration::from_millis(1)).await;
    }
}

/// Monotonic, node-scoped 64-bit ID generator.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    node_id: u64,
    inner: Arc<Mutex<State>>,
}

impl IdGenerator {
    pub fn new(node_id: u64) -> Self {
        Self {
            node_id: node_id & MAX_NODE_ID,
            inner: Arc::new(Mutex::new(State::default())),
        }
    }

    pub async fn next(&self) -> u64 {
        self.inner.lock().await.next(self.node_id).await
    }
}
