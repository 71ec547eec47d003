use serde::{Deserialize, Serialize};

/// This node's own identity, as it should appear in the controller's
/// `shardServers` list once it registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identifier. 0 means "unassigned, ask the controller".
    pub node_id: u64,
    /// Host the shard-server listens on for SDBP (client) connections.
    pub host: String,
    /// SDBP (client wire protocol) port.
    pub sdbp_port: u16,
    /// HTTP admin/debug port: out of scope for this crate, but the
    /// address needs to be known so it can be advertised.
    pub http_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            host: "127.0.0.1".into(),
            sdbp_port: 7080,
            http_port: 8080,
        }
    }
}

impl NodeConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.sdbp_port)
    }
}
