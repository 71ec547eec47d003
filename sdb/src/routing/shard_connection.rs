//! A pipelined connection to one shard server: requests are written as
//! soon as they're issued and matched back to their caller by
//! `commandID` as responses trickle in, rather than one request waiting
//! on the previous one's response.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::ids::CommandId;
use crate::net::{Frame, Request, Response, Stream};

use super::error::Error;

pub struct ShardConnection {
    addr: String,
    write_half: AsyncMutex<WriteHalf<Stream>>,
    pending: Arc<Mutex<HashMap<CommandId, oneshot::Sender<Response>>>>,
    reader: JoinHandle<()>,
}

impl ShardConnection {
    pub async fn connect(addr: &str) -> Result<Self, Error> {
        let stream = Stream::connect(addr).await?;
        let (read_half, write_half) = tokio::io::split(stream);
        let pending: Arc<Mutex<HashMap<CommandId, oneshot::Sender<Response>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let reader = tokio::spawn(Self::read_loop(read_half, pending.clone()));

        Ok(Self {
            addr: addr.to_string(),
            write_half: AsyncMutex::new(write_half),
            pending,
            reader,
        })
    }

    async fn read_loop(
        mut read_half: ReadHalf<Stream>,
        pending: Arc<Mutex<HashMap<CommandId, oneshot::Sender<Response>>>>,
    ) {
        loop {
            let bytes = match Frame::read(&mut read_half).await {
                Ok(bytes) => bytes,
                Err(_) => break,
            };
            let response = match Response::decode(bytes) {
                Ok(response) => response,
                Err(_) => continue,
            };
            if let Some(sender) = pending.lock().remove(&response.command_id) {
                let _ = sender.send(response);
            }
        }

        for (_, sender) in pending.lock().drain() {
            drop(sender);
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and await its matching response. Safe to call
    /// concurrently from many tasks sharing the same connection — each
    /// call only holds the write half lock long enough to flush its
    /// frame.
    pub async fn send(&self, request: &Request) -> Result<Response, Error> {
        let command_id = request.command_id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(command_id, tx);

        let encoded = request.encode()?;
        {
            let mut write_half = self.write_half.lock().await;
            Frame::write(&mut *write_half, &encoded).await?;
        }

        rx.await.map_err(|_| Error::Timeout(command_id))
    }
}

impl Drop for ShardConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::{CommandId, TableId};
    use crate::net::RequestType;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_roundtrip_against_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = Stream::from_tcp(socket);
            loop {
                let bytes = match Frame::read(&mut stream).await {
                    Ok(b) => b,
                    Err(_) => break,
                };
                let request = Request::decode(bytes).unwrap();
                let response = Response::ok(request.command_id);
                Frame::write(&mut stream, &response.encode().unwrap())
                    .await
                    .unwrap();
            }
        });

        let conn = ShardConnection::connect(&addr.to_string()).await.unwrap();
        let request = Request {
            command_id: CommandId(1),
            kind: Some(RequestType::Get),
            table_id: Some(TableId(1)),
            key: Some(bytes::Bytes::from_static(b"k")),
            ..Default::default()
        };
        let response = conn.send(&request).await.unwrap();
        assert_eq!(response.command_id, CommandId(1));
    }
}
