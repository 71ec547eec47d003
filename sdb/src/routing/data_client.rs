//! The pipelined, shard-bound half of the routing facade: resolve
//! `(table, key)` to a shard's primary, reuse or open a connection to
//! it, send, interpret.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::ids::{CommandId, NodeId, TableId};
use crate::net::{Request, RequestType, Response, ResponseType};

use super::error::Error;
use super::result::RoutingValue;
use super::session::Session;
use super::shard_connection::ShardConnection;

pub struct DataClient {
    session: Arc<Session>,
    connections: RwLock<HashMap<NodeId, Arc<ShardConnection>>>,
    next_command_id: AtomicU64,
}

impl DataClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            connections: RwLock::new(HashMap::new()),
            next_command_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_command_id(&self) -> CommandId {
        CommandId(self.next_command_id.fetch_add(1, Ordering::SeqCst))
    }

    fn current_table(&self) -> Result<TableId, Error> {
        self.session.current_table().ok_or(Error::NoTableSelected)
    }

    /// Resolve a key against the cached `ConfigState` to the node that
    /// currently holds its quorum's primary.
    fn resolve(&self, table_id: TableId, key: &[u8]) -> Result<(NodeId, String), Error> {
        let config = self.session.config();
        let shard_id = config
            .resolve_shard(table_id, key)
            .ok_or(Error::NoShardForKey(table_id))?;
        let shard = config
            .shards
            .get(&shard_id)
            .ok_or(Error::NoShardForKey(table_id))?;
        let primary = config
            .quorum_primary(shard.quorum_id)
            .ok_or(Error::NoPrimary(shard.quorum_id))?;
        let server = config
            .shard_servers
            .get(&primary)
            .ok_or(Error::NoSuchNode(primary))?;
        Ok((primary, format!("{}:{}", server.endpoint, server.sdbp_port)))
    }

    async fn connection_for(&self, node_id: NodeId, addr: &str) -> Result<Arc<ShardConnection>, Error> {
        if let Some(conn) = self.connections.read().get(&node_id).cloned() {
            return Ok(conn);
        }
        let conn = Arc::new(ShardConnection::connect(addr).await?);
        self.connections.write().insert(node_id, conn.clone());
        Ok(conn)
    }

    /// Send one request to the resolved shard primary. Evicts the
    /// cached connection on `NOSERVICE` so the next attempt (driven by
    /// `routing::Client`'s reassignment loop, after a config refresh)
    /// opens a fresh one.
    pub(crate) async fn execute(&self, request: Request) -> Result<Response, Error> {
        let table_id = request.table_id.ok_or(Error::NoTableSelected)?;
        // `ListKeys`/`ListKeyValues`/`Count` carry their routing key in
        // `start_key`, not `key`.
        let key = request
            .key
            .clone()
            .or_else(|| request.start_key.clone())
            .unwrap_or_default();
        let (node_id, addr) = self.resolve(table_id, &key)?;
        let conn = self.connection_for(node_id, &addr).await?;

        let response = conn.send(&request).await?;
        match response.kind {
            Some(ResponseType::NoService) => {
                self.connections.write().remove(&node_id);
                Err(Error::NoService(request.command_id))
            }
            Some(ResponseType::BadSchema) => Err(Error::BadSchema(request.command_id)),
            _ => Ok(response),
        }
    }

    async fn simple(&self, kind: RequestType, key: &[u8], value: Option<Bytes>, test_value: Option<Bytes>) -> Result<Response, Error> {
        let request = Request {
            command_id: self.next_command_id(),
            kind: Some(kind),
            table_id: Some(self.current_table()?),
            key: Some(Bytes::copy_from_slice(key)),
            value,
            test_value,
            ..Default::default()
        };
        self.execute(request).await
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        let response = self.simple(RequestType::Get, key, None, None).await?;
        Ok(response.value)
    }

    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let response = self
            .simple(RequestType::Set, key, Some(Bytes::copy_from_slice(value)), None)
            .await?;
        ok_or_failed(&response)
    }

    pub async fn set_if_not_exists(&self, key: &[u8], value: &[u8]) -> Result<bool, Error> {
        let response = self
            .simple(RequestType::SetIfNotExists, key, Some(Bytes::copy_from_slice(value)), None)
            .await?;
        Ok(response.kind == Some(ResponseType::Ok))
    }

    pub async fn test_and_set(&self, key: &[u8], test_value: &[u8], value: &[u8]) -> Result<bool, Error> {
        let response = self
            .simple(
                RequestType::TestAndSet,
                key,
                Some(Bytes::copy_from_slice(value)),
                Some(Bytes::copy_from_slice(test_value)),
            )
            .await?;
        Ok(response.kind == Some(ResponseType::Ok))
    }

    pub async fn get_and_set(&self, key: &[u8], value: &[u8]) -> Result<Option<Bytes>, Error> {
        let response = self
            .simple(RequestType::GetAndSet, key, Some(Bytes::copy_from_slice(value)), None)
            .await?;
        Ok(response.value)
    }

    pub async fn add(&self, key: &[u8], delta: i64) -> Result<i64, Error> {
        let response = self
            .simple(RequestType::Add, key, Some(Bytes::from(delta.to_be_bytes().to_vec())), None)
            .await?;
        response.number.ok_or(Error::UnexpectedResponse)
    }

    pub async fn append(&self, key: &[u8], suffix: &[u8]) -> Result<Bytes, Error> {
        let response = self
            .simple(RequestType::Append, key, Some(Bytes::copy_from_slice(suffix)), None)
            .await?;
        response.value.ok_or(Error::UnexpectedResponse)
    }

    pub async fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let response = self.simple(RequestType::Delete, key, None, None).await?;
        ok_or_failed(&response)
    }

    pub async fn remove(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        let response = self.simple(RequestType::Remove, key, None, None).await?;
        Ok(response.value)
    }

    /// Resolve once, then follow `NEXT` continuations until a terminal
    /// response arrives: accumulate each page into the caller's result,
    /// rewrite the request with the new `startKey`, and resend.
    pub async fn list_keys(&self, start_key: &[u8], count: u64) -> Result<Vec<Bytes>, Error> {
        let mut accumulated = Vec::new();
        let mut start_key = Bytes::copy_from_slice(start_key);
        let mut remaining = count;

        loop {
            let request = Request {
                command_id: self.next_command_id(),
                kind: Some(RequestType::ListKeys),
                table_id: Some(self.current_table()?),
                start_key: Some(start_key.clone()),
                count: Some(remaining),
                ..Default::default()
            };
            let response = self.execute(request).await?;
            accumulated.extend(response.keys);

            match response.kind {
                Some(ResponseType::Next) => {
                    let next = response.next.ok_or(Error::UnexpectedResponse)?;
                    if next.count == 0 {
                        break;
                    }
                    start_key = next.last_key;
                    remaining = next.count;
                }
                _ => break,
            }
        }

        Ok(accumulated)
    }

    pub async fn list_key_values(&self, start_key: &[u8], count: u64) -> Result<Vec<(Bytes, Bytes)>, Error> {
        let mut accumulated = Vec::new();
        let mut start_key = Bytes::copy_from_slice(start_key);
        let mut remaining = count;

        loop {
            let request = Request {
                command_id: self.next_command_id(),
                kind: Some(RequestType::ListKeyValues),
                table_id: Some(self.current_table()?),
                start_key: Some(start_key.clone()),
                count: Some(remaining),
                ..Default::default()
            };
            let response = self.execute(request).await?;
            accumulated.extend(response.key_values);

            match response.kind {
                Some(ResponseType::Next) => {
                    let next = response.next.ok_or(Error::UnexpectedResponse)?;
                    if next.count == 0 {
                        break;
                    }
                    start_key = next.last_key;
                    remaining = next.count;
                }
                _ => break,
            }
        }

        Ok(accumulated)
    }

    pub async fn count(&self, start_key: &[u8], count: u64) -> Result<i64, Error> {
        let request = Request {
            command_id: self.next_command_id(),
            kind: Some(RequestType::Count),
            table_id: Some(self.current_table()?),
            start_key: Some(Bytes::copy_from_slice(start_key)),
            count: Some(count),
            ..Default::default()
        };
        self.execute(request)
            .await?
            .number
            .ok_or(Error::UnexpectedResponse)
    }
}

fn ok_or_failed(response: &Response) -> Result<(), Error> {
    match response.kind {
        Some(ResponseType::Ok) => Ok(()),
        _ => Err(Error::ServerFailed(response.command_id)),
    }
}

/// Interpret a completed [`Response`] generically, for callers (like
/// `routing::batch`) that issue a request whose `RequestType` isn't
/// known until runtime.
pub fn interpret(response: Response) -> RoutingValue {
    match response.kind {
        Some(ResponseType::Number) | Some(ResponseType::SNumber) => {
            RoutingValue::Number(response.number.unwrap_or_default())
        }
        Some(ResponseType::Value) => RoutingValue::Value(response.value),
        Some(ResponseType::ListKeys) => RoutingValue::Keys(response.keys),
        Some(ResponseType::ListKeyValues) => RoutingValue::KeyValues(response.key_values),
        _ => RoutingValue::Ok,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::configplane::{ConfigState, QuorumInfo, ShardInfo, ShardServerInfo, ShardState, TableInfo};
    use crate::ids::{DatabaseId, QuorumId, ShardId};
    use crate::configplane::state::KeyRange;
    use sdb_config::General;

    fn session_with_one_shard() -> (Arc<Session>, TableId) {
        let session = Arc::new(Session::new(General::default()));
        let mut state = ConfigState::default();

        state.shard_servers.insert(
            NodeId(1),
            ShardServerInfo {
                node_id: NodeId(1),
                endpoint: "127.0.0.1".into(),
                sdbp_port: 1,
                http_port: 2,
            },
        );
        state.quorums.insert(
            QuorumId(1),
            QuorumInfo {
                active_nodes: vec![NodeId(1)],
                has_primary: true,
                primary_id: Some(NodeId(1)),
                shards: vec![ShardId(1)],
                ..Default::default()
            },
        );
        state.tables.insert(
            TableId(1),
            TableInfo {
                name: "t".into(),
                database_id: DatabaseId(1),
                shards: vec![ShardId(1)],
            },
        );
        state.shards.insert(
            ShardId(1),
            ShardInfo {
                table_id: TableId(1),
                quorum_id: QuorumId(1),
                range: KeyRange::new(None, None),
                state: ShardState::Normal,
                parent_shard_id: None,
            },
        );

        session.set_config(state);
        session.use_database(DatabaseId(1));
        session.use_table(TableId(1));
        (session, TableId(1))
    }

    #[test]
    fn test_resolve_finds_primary_endpoint() {
        let (session, table_id) = session_with_one_shard();
        let client = DataClient::new(session);
        let (node_id, addr) = client.resolve(table_id, b"k").unwrap();
        assert_eq!(node_id, NodeId(1));
        assert_eq!(addr, "127.0.0.1:1");
    }

    #[test]
    fn test_resolve_without_primary_errors() {
        let (session, table_id) = session_with_one_shard();
        let mut state = (*session.config()).clone();
        state.quorums.get_mut(&QuorumId(1)).unwrap().has_primary = false;
        session.set_config(state);

        let client = DataClient::new(session);
        let err = client.resolve(table_id, b"k").unwrap_err();
        assert!(matches!(err, Error::NoPrimary(_)));
    }

    #[test]
    fn test_no_table_selected_errors() {
        let session = Arc::new(Session::new(General::default()));
        let client = DataClient::new(session);
        assert!(matches!(client.current_table(), Err(Error::NoTableSelected)));
    }
}
