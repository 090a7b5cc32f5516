//! Request/response correlation with the page host.
//!
//! The session is `Idle` until a host attaches over the bridge socket and
//! `Connected` afterwards. Only one host is served at a time: attaching a new
//! one closes the previous connection and rejects whatever was still waiting
//! on it. Requests carry a fresh UUID; responses may arrive in any order and
//! are matched back by id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tabpilot_core::error::ApiError;
use tabpilot_core::protocol::{Method, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::daemon::wire;

type Reply = Result<Value, ApiError>;

struct ActiveConnection {
    id: u64,
    outbox: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct PendingRequest {
    connection: u64,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct SessionState {
    next_connection: u64,
    connection: Option<ActiveConnection>,
    pending: HashMap<String, PendingRequest>,
}

impl SessionState {
    /// Tear down `connection` and reject everything sent over it.
    fn detach(&mut self, connection: ActiveConnection) {
        connection.reader.abort();
        connection.writer.abort();

        let ids: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.connection == connection.id)
            .map(|(id, _)| id.clone())
            .collect();
        if !ids.is_empty() {
            debug!(
                "Rejecting {} pending request(s) of connection {}",
                ids.len(),
                connection.id
            );
        }
        for id in ids {
            if let Some(pending) = self.pending.remove(&id) {
                let _ = pending.tx.send(Err(ApiError::connection_closed()));
            }
        }
    }
}

/// Correlates daemon calls with page host responses.
#[derive(Clone, Default)]
pub struct RpcSession {
    state: Arc<Mutex<SessionState>>,
}

impl RpcSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connection.is_some()
    }

    /// Number of calls still waiting for a response.
    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Serve a new page host connection, replacing any current one.
    pub fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut state = self.lock();

        if let Some(old) = state.connection.take() {
            info!("Replacing page host connection {}", old.id);
            state.detach(old);
        }

        state.next_connection += 1;
        let id = state.next_connection;
        let (outbox, inbox) = mpsc::unbounded_channel();

        // The reader settles responses under this lock, so none is handled
        // before the connection is registered.
        let writer = tokio::spawn(write_loop(id, writer, inbox));
        let reader = tokio::spawn(read_loop(self.clone(), id, reader));

        state.connection = Some(ActiveConnection {
            id,
            outbox,
            reader,
            writer,
        });
        info!("Page host connected (connection {})", id);
    }

    /// Close the current connection, rejecting every pending call.
    pub fn close(&self) {
        let mut state = self.lock();
        if let Some(connection) = state.connection.take() {
            info!("Closing page host connection {}", connection.id);
            state.detach(connection);
        }
        for (_, pending) in state.pending.drain() {
            let _ = pending.tx.send(Err(ApiError::connection_closed()));
        }
    }

    /// Send a request to the page host and wait for its response.
    pub async fn call(&self, method: Method, params: Value, timeout: Duration) -> Reply {
        let id = Uuid::new_v4().to_string();

        let rx = {
            let mut state = self.lock();
            let Some(connection) = state.connection.as_ref() else {
                return Err(ApiError::no_tab());
            };

            let line = serde_json::to_string(&Request::new(id.clone(), method, params))
                .map_err(|e| ApiError::internal(format!("failed to encode request: {}", e)))?;
            if connection.outbox.send(line).is_err() {
                return Err(ApiError::connection_closed());
            }

            let (tx, rx) = oneshot::channel();
            let connection = connection.id;
            state
                .pending
                .insert(id.clone(), PendingRequest { connection, tx });
            rx
        };

        let _guard = PendingGuard {
            session: self,
            id: &id,
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ApiError::connection_closed()),
            Err(_) => {
                warn!("{} request {} timed out after {:?}", method, id, timeout);
                Err(ApiError::timeout(method.as_str(), timeout.as_millis()))
            }
        }
    }

    fn settle(&self, connection: u64, response: Response) {
        let pending = self.lock().pending.remove(&response.id);
        match pending {
            Some(pending) => {
                if pending.connection != connection {
                    debug!("Response {} arrived on a newer connection", response.id);
                }
                // The caller may have given up already.
                let _ = pending.tx.send(response.into_result());
            }
            None => warn!("Ignoring response with unknown id {}", response.id),
        }
    }

    fn disconnected(&self, connection: u64) {
        let mut state = self.lock();
        let is_current = state
            .connection
            .as_ref()
            .is_some_and(|active| active.id == connection);
        if is_current {
            if let Some(active) = state.connection.take() {
                info!("Page host disconnected (connection {})", connection);
                state.detach(active);
            }
        }
    }
}

/// Drops the pending entry when a call returns or is abandoned.
struct PendingGuard<'a> {
    session: &'a RpcSession,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().pending.remove(self.id);
    }
}

async fn write_loop<W>(connection: u64, mut writer: W, mut inbox: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = inbox.recv().await {
        line.push('\n');
        if let Err(e) = wire::write_raw_line(&mut writer, &line).await {
            warn!("Write to page host {} failed: {}", connection, e);
            break;
        }
    }
}

async fn read_loop<R>(session: RpcSession, connection: u64, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match wire::read_line(&mut reader, &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Read from page host {} failed: {}", connection, e);
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Response>(trimmed) {
            Ok(response) => session.settle(connection, response),
            Err(e) => warn!("Ignoring malformed message from page host: {}", e),
        }
    }

    session.disconnected(connection);
}
