//! A single-in-flight connection to a controller: schema ops and
//! `GetConfigState` are infrequent enough that they don't need the
//! shard connection's pipelining, so one `tokio::sync::Mutex` around
//! the whole round trip is simplest and keeps controller requests
//! serialized.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::configplane::ConfigCommand;
use crate::configplane::ConfigState;
use crate::ids::CommandId;
use crate::net::{Frame, Request, RequestType, Response, ResponseType, Stream};

use super::error::Error;

pub struct ControllerConnection {
    endpoints: Vec<String>,
    stream: Mutex<Option<Stream>>,
    next_command_id: AtomicU64,
}

impl ControllerConnection {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            stream: Mutex::new(None),
            next_command_id: AtomicU64::new(1),
        }
    }

    fn next_command_id(&self) -> CommandId {
        CommandId(self.next_command_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, Error> {
        if self.endpoints.is_empty() {
            return Err(Error::NoControllers);
        }

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            let mut last_err = None;
            for endpoint in &self.endpoints {
                match Stream::connect(endpoint).await {
                    Ok(stream) => {
                        *guard = Some(stream);
                        break;
                    }
                    Err(e) => last_err = Some(e.to_string()),
                }
            }
            if guard.is_none() {
                return Err(Error::ControllerUnreachable(
                    last_err.unwrap_or_else(|| "no controllers configured".into()),
                ));
            }
        }

        // guard is Some here: either it already was, or the connect loop above filled it.
        let stream = guard.as_mut().unwrap();
        let encoded = request.encode()?;
        if Frame::write(stream, &encoded).await.is_err() {
            *guard = None;
            return Err(Error::ControllerUnreachable("write failed".into()));
        }

        match Frame::read(stream).await {
            Ok(bytes) => Ok(Response::decode(bytes)?),
            Err(_) => {
                *guard = None;
                Err(Error::ControllerUnreachable("read failed".into()))
            }
        }
    }

    pub async fn get_config_state(&self) -> Result<ConfigState, Error> {
        let request = Request {
            command_id: self.next_command_id(),
            kind: Some(RequestType::GetConfigState),
            ..Default::default()
        };
        let response = self.round_trip(&request).await?;
        let payload = response.value.ok_or(Error::UnexpectedResponse)?;
        serde_json::from_slice(&payload).map_err(|_| Error::UnexpectedResponse)
    }

    pub async fn propose_schema_command(&self, command: ConfigCommand) -> Result<(), Error> {
        let payload = serde_json::to_vec(&command).map_err(|_| Error::UnexpectedResponse)?;
        let request = Request {
            command_id: self.next_command_id(),
            kind: Some(RequestType::SchemaOp),
            value: Some(bytes::Bytes::from(payload)),
            ..Default::default()
        };
        let response = self.round_trip(&request).await?;
        match response.kind {
            Some(ResponseType::Ok) => Ok(()),
            _ => Err(Error::ServerFailed(request.command_id)),
        }
    }
}
