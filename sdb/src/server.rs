//! The shard server's connection listener: accepts client connections,
//! decodes one [`Request`] per frame, and serves it either
//! straight off local storage (reads, gated by the quorum's lease) or
//! by driving it through Paxos first (mutations).
//!
//! A shard quorum's membership (`peers`) is ordinarily learned from the
//! controller's `ConfigState`; the single-node case (`peers` empty) is
//! a legitimate deployment mode, not a special case — a lone proposer's
//! own vote already satisfies `majority(1)`, so `quorum::Context`
//! reaches quorum without ever opening a peer connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tokio::sync::Notify;
use tokio::{select, spawn};
use tracing::{error, info, warn};

use bytes::Bytes;
use sdb_config::{General, StorageConfig};

use crate::ids::{NodeId, QuorumId, ShardId};
use crate::net::{Frame, NextCursor, Request, RequestType, Response, ResponseType, Stream};
use crate::quorum::{ClusterTransport, Context};
use crate::shard::{ShardCommand, ShardQuorumProcessor};
use crate::storage::Environment;

type ShardContext = Context<Environment, ClusterTransport, ShardQuorumProcessor>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] crate::storage::Error),
}

/// One shard quorum's server-side: storage, the Paxos-backed replicated
/// log over it, and the SDBP listener front end.
pub struct ShardServer {
    addr: String,
    context: Arc<ShardContext>,
    processor: Arc<ShardQuorumProcessor>,
    shutdown: Arc<Notify>,
}

impl ShardServer {
    /// Open this shard's storage and bind its quorum `Context`. `peers`
    /// empty means a single-node quorum.
    pub async fn bootstrap(
        node_id: NodeId,
        addr: String,
        storage: &StorageConfig,
        general: General,
        shard_id: ShardId,
        quorum_id: QuorumId,
        peers: Vec<NodeId>,
        transport: Arc<ClusterTransport>,
    ) -> Result<Self, Error> {
        let env = Arc::new(Environment::open(storage.shard_dir(shard_id.0), shard_id, general).await?);
        let processor = Arc::new(ShardQuorumProcessor::new(env.clone()));
        let context = Arc::new(Context::new(
            quorum_id,
            node_id,
            peers,
            env,
            transport,
            processor.clone(),
        ));

        Ok(Self {
            addr,
            context,
            processor,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn listen(&self) -> Result<(), Error> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!("shard server listening on {}", self.addr);

        loop {
            select! {
                accepted = listener.accept() => {
                    let (socket, peer) = accepted?;
                    let stream = Stream::from_tcp(socket);
                    let context = self.context.clone();
                    let processor = self.processor.clone();
                    spawn(async move {
                        if let Err(err) = Self::handle_connection(stream, context, processor).await {
                            warn!(%peer, "connection closed: {err}");
                        }
                    });
                }

                _ = ctrl_c() => {
                    self.shutdown.notify_one();
                }

                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(
        mut stream: Stream,
        context: Arc<ShardContext>,
        processor: Arc<ShardQuorumProcessor>,
    ) -> Result<(), Error> {
        loop {
            let bytes = match Frame::read(&mut stream).await {
                Ok(bytes) => bytes,
                Err(_) => return Ok(()),
            };

            let response = match Request::decode(bytes) {
                Ok(request) => Self::serve(&context, &processor, request).await,
                Err(_) => continue,
            };

            match response.encode() {
                Ok(encoded) => Frame::write(&mut stream, &encoded).await?,
                Err(err) => {
                    error!("failed to encode response: {err}");
                    return Ok(());
                }
            }
        }
    }

    /// Dispatch one request: reads go straight to the processor, writes
    /// are encoded as a [`ShardCommand`] and driven through Paxos.
    async fn serve(context: &ShardContext, processor: &ShardQuorumProcessor, request: Request) -> Response {
        let command_id = request.command_id;
        let key = request.key.clone().unwrap_or_default();

        match request.kind {
            Some(RequestType::Get) => match processor.get(&key).await {
                Some(value) => Response::value(command_id, value),
                None => Response::failed(command_id),
            },

            Some(RequestType::ListKeys) => {
                let start = request.start_key.clone().unwrap_or_default();
                let requested = request.count.unwrap_or(0);
                let (keys, has_more) = processor.list_keys(&start, requested as usize).await;
                match next_cursor(has_more, &keys, |k| k.clone(), requested) {
                    Some(next) => Response {
                        command_id,
                        kind: Some(ResponseType::Next),
                        keys,
                        next: Some(next),
                        ..Default::default()
                    },
                    None => Response {
                        command_id,
                        kind: Some(ResponseType::ListKeys),
                        keys,
                        ..Default::default()
                    },
                }
            }

            Some(RequestType::ListKeyValues) => {
                let start = request.start_key.clone().unwrap_or_default();
                let requested = request.count.unwrap_or(0);
                let (key_values, has_more) = processor.list_key_values(&start, requested as usize).await;
                match next_cursor(has_more, &key_values, |(k, _)| k.clone(), requested) {
                    Some(next) => Response {
                        command_id,
                        kind: Some(ResponseType::Next),
                        key_values,
                        next: Some(next),
                        ..Default::default()
                    },
                    None => Response {
                        command_id,
                        kind: Some(ResponseType::ListKeyValues),
                        key_values,
                        ..Default::default()
                    },
                }
            }

            Some(RequestType::Count) => Response {
                command_id,
                kind: Some(ResponseType::Number),
                number: Some(processor.count().await as i64),
                ..Default::default()
            },

            Some(RequestType::Set) => {
                let value = request.value.clone().unwrap_or_default();
                match context.propose(ShardCommand::Set { key, value }.encode()).await {
                    Ok(_) => Response::ok(command_id),
                    Err(_) => Response::no_service(command_id),
                }
            }

            Some(RequestType::SetIfNotExists) => {
                let value = request.value.clone().unwrap_or_default();
                match context
                    .propose(ShardCommand::SetIfNotExists { key, value }.encode())
                    .await
                {
                    Ok(pos) => boolean_response(command_id, processor.take_result(pos).await),
                    Err(_) => Response::no_service(command_id),
                }
            }

            Some(RequestType::TestAndSet) => {
                let value = request.value.clone().unwrap_or_default();
                let test_value = request.test_value.clone().unwrap_or_default();
                match context
                    .propose(ShardCommand::TestAndSet { key, test_value, value }.encode())
                    .await
                {
                    Ok(pos) => boolean_response(command_id, processor.take_result(pos).await),
                    Err(_) => Response::no_service(command_id),
                }
            }

            Some(RequestType::GetAndSet) => {
                let value = request.value.clone().unwrap_or_default();
                match context.propose(ShardCommand::GetAndSet { key, value }.encode()).await {
                    Ok(pos) => Response::value(command_id, processor.take_result(pos).await.unwrap_or_default()),
                    Err(_) => Response::no_service(command_id),
                }
            }

            Some(RequestType::Add) => {
                let delta = request
                    .value
                    .as_deref()
                    .and_then(|v| v.try_into().ok())
                    .map(i64::from_be_bytes)
                    .unwrap_or(0);
                match context.propose(ShardCommand::Add { key, delta }.encode()).await {
                    Ok(pos) => {
                        let updated = processor.take_result(pos).await.unwrap_or_default();
                        let parsed = std::str::from_utf8(&updated).ok().and_then(|s| s.parse().ok());
                        match parsed {
                            Some(number) => Response {
                                command_id,
                                kind: Some(ResponseType::Number),
                                number: Some(number),
                                ..Default::default()
                            },
                            None => Response::failed(command_id),
                        }
                    }
                    Err(_) => Response::no_service(command_id),
                }
            }

            Some(RequestType::Append) => {
                let suffix = request.value.clone().unwrap_or_default();
                match context.propose(ShardCommand::Append { key, suffix }.encode()).await {
                    Ok(pos) => Response::value(command_id, processor.take_result(pos).await.unwrap_or_default()),
                    Err(_) => Response::no_service(command_id),
                }
            }

            Some(RequestType::Delete) => match context.propose(ShardCommand::Delete { key }.encode()).await {
                Ok(_) => Response::ok(command_id),
                Err(_) => Response::no_service(command_id),
            },

            Some(RequestType::Remove) => match context.propose(ShardCommand::Remove { key }.encode()).await {
                Ok(pos) => Response {
                    command_id,
                    kind: Some(ResponseType::Value),
                    value: processor.take_result(pos).await,
                    ..Default::default()
                },
                Err(_) => Response::no_service(command_id),
            },

            // Schema mutation and config-state sync are the controller's
            // concern, not a shard server's; a client should never route
            // them here.
            Some(RequestType::SchemaOp) | Some(RequestType::GetConfigState) | None => {
                Response::failed(command_id)
            }
        }
    }
}

/// Build a `NEXT` continuation when a page was truncated: the caller
/// resumes at the last returned entry's key, asking for whatever it
/// still wants after this page.
fn next_cursor<T>(has_more: bool, page: &[T], key_of: impl Fn(&T) -> Bytes, requested: u64) -> Option<NextCursor> {
    if !has_more {
        return None;
    }
    let last_key = page.last().map(key_of).unwrap_or_default();
    Some(NextCursor {
        last_key,
        end_key: Bytes::new(),
        count: requested.saturating_sub(page.len() as u64),
    })
}

/// `SetIfNotExists`/`TestAndSet` stash `"1"`/`"0"` — translate that into
/// the response kind `routing::DataClient` checks (`Ok` ⇒ `true`).
fn boolean_response(command_id: crate::ids::CommandId, result: Option<bytes::Bytes>) -> Response {
    let matched = result.as_deref() == Some(b"1");
    if matched {
        Response::ok(command_id)
    } else {
        Response::failed(command_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::{CommandId, TableId};
    use bytes::Bytes;

    async fn single_node_context() -> (tempfile::TempDir, Arc<ShardContext>, Arc<ShardQuorumProcessor>) {
        context_with_general(General::default()).await
    }

    async fn context_with_general(general: General) -> (tempfile::TempDir, Arc<ShardContext>, Arc<ShardQuorumProcessor>) {
        let dir = tempfile::tempdir().unwrap();
        let env = Arc::new(
            Environment::open(dir.path().to_path_buf(), ShardId(1), general)
                .await
                .unwrap(),
        );
        let processor = Arc::new(ShardQuorumProcessor::new(env.clone()));
        let transport = Arc::new(ClusterTransport::new());
        let context = Arc::new(Context::new(QuorumId(1), NodeId(1), vec![], env, transport, processor.clone()));
        (dir, context, processor)
    }

    fn request(command_id: u64, kind: RequestType, key: &[u8]) -> Request {
        Request {
            command_id: CommandId(command_id),
            kind: Some(kind),
            table_id: Some(TableId(1)),
            key: Some(Bytes::copy_from_slice(key)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips_through_paxos() {
        let (_dir, context, processor) = single_node_context().await;

        let mut set = request(1, RequestType::Set, b"k");
        set.value = Some(Bytes::from_static(b"v"));
        let response = ShardServer::serve(&context, &processor, set).await;
        assert_eq!(response.kind, Some(ResponseType::Ok));

        let get = request(2, RequestType::Get, b"k");
        let response = ShardServer::serve(&context, &processor, get).await;
        assert_eq!(response.value.as_deref(), Some(&b"v"[..]));
    }

    #[tokio::test]
    async fn test_get_missing_key_fails() {
        let (_dir, context, processor) = single_node_context().await;
        let response = ShardServer::serve(&context, &processor, request(1, RequestType::Get, b"missing")).await;
        assert_eq!(response.kind, Some(ResponseType::Failed));
    }

    #[tokio::test]
    async fn test_test_and_set_reports_mismatch() {
        let (_dir, context, processor) = single_node_context().await;

        let mut req = request(1, RequestType::TestAndSet, b"k");
        req.test_value = Some(Bytes::from_static(b"expected"));
        req.value = Some(Bytes::from_static(b"new"));
        let response = ShardServer::serve(&context, &processor, req).await;
        assert_eq!(response.kind, Some(ResponseType::Failed));
    }

    #[tokio::test]
    async fn test_add_accumulates_through_paxos() {
        let (_dir, context, processor) = single_node_context().await;

        let mut first = request(1, RequestType::Add, b"n");
        first.value = Some(Bytes::from(5i64.to_be_bytes().to_vec()));
        let response = ShardServer::serve(&context, &processor, first).await;
        assert_eq!(response.number, Some(5));

        let mut second = request(2, RequestType::Add, b"n");
        second.value = Some(Bytes::from((-2i64).to_be_bytes().to_vec()));
        let response = ShardServer::serve(&context, &processor, second).await;
        assert_eq!(response.number, Some(3));
    }

    #[tokio::test]
    async fn test_list_keys_emits_next_past_page_size() {
        let mut general = General::default();
        general.list_page_size = 1;
        let (_dir, context, processor) = context_with_general(general).await;

        for key in [b"a".as_slice(), b"b".as_slice()] {
            let mut set = request(1, RequestType::Set, key);
            set.value = Some(Bytes::from_static(b"v"));
            ShardServer::serve(&context, &processor, set).await;
        }

        let mut list = request(3, RequestType::ListKeys, b"");
        list.start_key = Some(Bytes::new());
        list.count = Some(10);
        let response = ShardServer::serve(&context, &processor, list).await;
        assert_eq!(response.kind, Some(ResponseType::Next));
        assert_eq!(response.keys, vec![Bytes::from_static(b"a")]);
        let next = response.next.unwrap();
        assert_eq!(next.last_key, Bytes::from_static(b"a"));
        assert_eq!(next.count, 9);

        let mut list = request(4, RequestType::ListKeys, b"");
        list.start_key = Some(next.last_key);
        list.count = Some(next.count);
        let response = ShardServer::serve(&context, &processor, list).await;
        assert_eq!(response.kind, Some(ResponseType::ListKeys));
        assert_eq!(response.keys, vec![Bytes::from_static(b"b")]);
    }

    #[tokio::test]
    async fn test_schema_op_rejected_by_shard_server() {
        let (_dir, context, processor) = single_node_context().await;
        let response = ShardServer::serve(&context, &processor, request(1, RequestType::SchemaOp, b"x")).await;
        assert_eq!(response.kind, Some(ResponseType::Failed));
    }
}
