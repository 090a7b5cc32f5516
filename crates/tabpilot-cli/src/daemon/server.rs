//! Unix socket server for the daemon process.
//!
//! The daemon listens on two sockets. CLI clients send requests on the
//! control socket; the daemon validates them and forwards each one over the
//! [`RpcSession`] to the page host, which connects on the bridge socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;
use tabpilot_core::error::ApiError;
use tabpilot_core::protocol::{Command, Request, Response};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::daemon::paths::SessionPaths;
use crate::daemon::rpc::RpcSession;
use crate::daemon::wire;

/// Maximum number of concurrent client connections.
const MAX_CONNECTIONS: usize = 100;

/// How long the daemon waits with no page host and no clients before exiting.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How long in-flight client connections get to finish during shutdown.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Control-socket method that stops the daemon. Never forwarded to the host.
pub const SHUTDOWN_METHOD: &str = "shutdown";

pub struct DaemonServer {
    control: UnixListener,
    bridge: UnixListener,
    paths: SessionPaths,
    call_timeout: Duration,
    rpc: RpcSession,
    connection_semaphore: Arc<Semaphore>,
    shutdown: Arc<Notify>,
}

impl DaemonServer {
    /// Bind the sockets of the session named by the environment.
    pub async fn bind(call_timeout: Duration) -> Result<Self> {
        Self::bind_to(SessionPaths::from_env(), call_timeout).await
    }

    /// Bind the control and bridge sockets at `paths`.
    ///
    /// Binding comes first and liveness is checked only on `AddrInUse`, so two
    /// daemons racing for one session cannot both win:
    /// 1. Try to bind the control socket
    /// 2. If it is in use, consult the PID file
    /// 3. A live owner is an error; a dead one leaves a stale socket to remove
    pub async fn bind_to(paths: SessionPaths, call_timeout: Duration) -> Result<Self> {
        paths
            .ensure_dir()
            .with_context(|| format!("Failed to create socket directory for {:?}", paths.control))?;

        let control = match UnixListener::bind(&paths.control) {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if is_daemon_alive(&paths.pid) {
                    anyhow::bail!(
                        "Daemon already running (socket {:?} in use, PID file valid)",
                        paths.control
                    );
                }
                remove_stale_socket(&paths.control)?;
                UnixListener::bind(&paths.control)
                    .with_context(|| format!("Failed to bind to socket: {:?}", paths.control))?
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to bind to socket: {:?}", paths.control));
            }
        };

        // Written right after the bind so a competitor never sees our socket
        // without a valid PID file.
        std::fs::write(&paths.pid, std::process::id().to_string())
            .with_context(|| format!("Failed to write PID file: {:?}", paths.pid))?;

        // We own the control socket, so any bridge socket is left over.
        let bridge = match UnixListener::bind(&paths.bridge) {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                remove_stale_socket(&paths.bridge)?;
                UnixListener::bind(&paths.bridge)
                    .with_context(|| format!("Failed to bind to socket: {:?}", paths.bridge))?
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to bind to socket: {:?}", paths.bridge));
            }
        };

        info!(
            "Daemon listening on {:?} (bridge {:?})",
            paths.control, paths.bridge
        );

        Ok(Self {
            control,
            bridge,
            paths,
            call_timeout,
            rpc: RpcSession::new(),
            connection_semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    #[cfg(test)]
    fn rpc(&self) -> RpcSession {
        self.rpc.clone()
    }

    /// Accept clients and page hosts until shutdown is signaled.
    ///
    /// In-flight client connections get [`GRACEFUL_SHUTDOWN_TIMEOUT`] to
    /// finish. Socket and PID files are removed when the server is dropped.
    pub async fn run(&self) -> Result<()> {
        self.spawn_idle_shutdown_task();

        let mut connection_tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                result = self.control.accept() => match result {
                    Ok((stream, _addr)) => self.accept_client(stream, &mut connection_tasks),
                    Err(e) => error!("Accept error on control socket: {}", e),
                },
                result = self.bridge.accept() => match result {
                    Ok((stream, _addr)) => {
                        let (reader, writer) = stream.into_split();
                        self.rpc.attach(reader, writer);
                    }
                    Err(e) => error!("Accept error on bridge socket: {}", e),
                },
                Some(_) = connection_tasks.join_next(), if !connection_tasks.is_empty() => {}
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received, waiting for in-flight connections");
                    break;
                }
            }
        }

        self.rpc.close();

        if !connection_tasks.is_empty() {
            info!(
                "Waiting for {} in-flight connection(s) to complete",
                connection_tasks.len()
            );
            let drained = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, async {
                while connection_tasks.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!(
                    "Graceful shutdown timed out after {:?}, aborting {} connection(s)",
                    GRACEFUL_SHUTDOWN_TIMEOUT,
                    connection_tasks.len()
                );
                connection_tasks.abort_all();
            }
        }

        Ok(())
    }

    fn accept_client(&self, stream: UnixStream, tasks: &mut JoinSet<()>) {
        let permit = match self.connection_semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "Connection limit ({}) reached, rejecting new connection",
                    MAX_CONNECTIONS
                );
                return;
            }
        };

        debug!("Accepted client connection");
        let rpc = self.rpc.clone();
        let shutdown = self.shutdown.clone();
        let call_timeout = self.call_timeout;
        tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_client(stream, rpc, call_timeout, shutdown).await {
                error!("Connection error: {}", e);
            }
        });
    }

    /// Signal shutdown once there has been no page host and no client for
    /// [`IDLE_TIMEOUT`].
    fn spawn_idle_shutdown_task(&self) {
        let rpc = self.rpc.clone();
        let shutdown = self.shutdown.clone();
        let semaphore = self.connection_semaphore.clone();

        tokio::spawn(async move {
            let is_busy = || rpc.is_connected() || semaphore.available_permits() < MAX_CONNECTIONS;
            let mut idle_since: Option<Instant> = None;

            loop {
                tokio::time::sleep(IDLE_CHECK_INTERVAL).await;

                if is_busy() {
                    if idle_since.take().is_some() {
                        debug!("Activity detected, resetting idle timer");
                    }
                    continue;
                }

                let idle_start = *idle_since.get_or_insert_with(Instant::now);
                if idle_start.elapsed() < IDLE_TIMEOUT {
                    debug!(
                        "Idle for {} seconds (shutdown in {} seconds)",
                        idle_start.elapsed().as_secs(),
                        IDLE_TIMEOUT.saturating_sub(idle_start.elapsed()).as_secs()
                    );
                    continue;
                }

                info!(
                    "No page host or client for {} seconds, shutting down",
                    IDLE_TIMEOUT.as_secs()
                );
                shutdown.notify_one();
                break;
            }
        });
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        for path in [&self.paths.control, &self.paths.bridge, &self.paths.pid] {
            if path.exists() && std::fs::remove_file(path).is_err() {
                warn!("Failed to remove {:?} on shutdown", path);
            }
        }
    }
}

/// Whether the PID file names a process that is still running.
fn is_daemon_alive(pid_path: &Path) -> bool {
    let Ok(pid_str) = std::fs::read_to_string(pid_path) else {
        return false;
    };
    let Ok(pid) = pid_str.trim().parse::<i32>() else {
        return false;
    };

    // SAFETY: signal 0 delivers nothing; it only checks that the process
    // exists and may be signaled.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Remove a socket left behind by a dead daemon. Symlinks and non-socket
/// files are refused.
fn remove_stale_socket(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat socket path: {:?}", path))?;

    if metadata.file_type().is_symlink() {
        anyhow::bail!("Socket path {:?} is a symlink, refusing to delete it", path);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if !metadata.file_type().is_socket() {
            anyhow::bail!(
                "Path {:?} exists but is not a socket file (type: {:?})",
                path,
                metadata.file_type()
            );
        }
    }

    info!("Removing stale socket {:?}", path);
    std::fs::remove_file(path).with_context(|| format!("Failed to remove stale socket: {:?}", path))
}

async fn handle_client(
    stream: UnixStream,
    rpc: RpcSession,
    call_timeout: Duration,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if wire::read_line(&mut reader, &mut line).await? == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => handle_request(request, &rpc, call_timeout, &shutdown).await,
            Err(e) => Response::error(
                "unknown",
                ApiError::invalid_request_with_suggestion(
                    format!("Invalid JSON request: {}", e),
                    "Send one JSON object per line with 'id', 'method' and 'params'. Example: {\"id\":\"1\",\"method\":\"snapshot\",\"params\":{}}",
                ),
            ),
        };

        wire::write_message(&mut writer, &response).await?;
    }

    Ok(())
}

/// Validate a client request and forward it to the page host.
async fn handle_request(
    request: Request,
    rpc: &RpcSession,
    call_timeout: Duration,
    shutdown: &Arc<Notify>,
) -> Response {
    if request.method == SHUTDOWN_METHOD {
        info!("Received shutdown request, stopping daemon");
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            // Let the response flush first.
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.notify_one();
        });
        return Response::success(request.id, json!({ "message": "Daemon shutting down" }));
    }

    // Malformed requests never reach the page host.
    let command = match Command::from_request(&request) {
        Ok(command) => command,
        Err(e) => return Response::error(request.id, e),
    };

    debug!("Forwarding {} request {}", command.method(), request.id);
    let result = rpc
        .call(command.method(), command.params(), call_timeout)
        .await;
    if let Err(e) = &result {
        debug!("{} request {} failed: {}", command.method(), request.id, e);
    }
    Response::from_result(request.id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tabpilot_core::error::ErrorCode;
    use tabpilot_core::protocol::Method;
    use tabpilot_core::tab::{BuiltinLoader, Tab};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::time::timeout;
    use uuid::Uuid;

    const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(30_000);

    fn temp_paths(label: &str) -> (PathBuf, SessionPaths) {
        // Short paths: unix socket names are limited to about 100 bytes.
        let short_id = Uuid::new_v4().simple().to_string();
        let dir = PathBuf::from("/tmp").join(format!("tp-{}-{}", label, &short_id[..8]));
        let paths = SessionPaths::in_dir(&dir, "test");
        (dir, paths)
    }

    struct TestClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(path: &Path) -> Self {
            let stream = UnixStream::connect(path).await.expect("Failed to connect");
            let (reader, writer) = stream.into_split();
            Self {
                reader: BufReader::new(reader),
                writer,
            }
        }

        async fn send_line(&mut self, line: &str) -> Response {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
            let mut response_line = String::new();
            let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut response_line))
                .await
                .expect("Timeout reading response")
                .expect("Failed to read");
            assert!(read > 0, "Should have received a response");
            serde_json::from_str(&response_line).expect("Failed to parse response")
        }

        async fn send(&mut self, request: &Request) -> Response {
            self.send_line(&serde_json::to_string(request).unwrap()).await
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[tokio::test]
    async fn test_requests_reach_the_page_host() {
        let (dir, paths) = temp_paths("fwd");
        let server = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .expect("Failed to bind server");
        let rpc = server.rpc();
        let server_handle = tokio::spawn(async move {
            let _ = timeout(Duration::from_secs(10), server.run()).await;
        });

        let host_stream = UnixStream::connect(&paths.bridge)
            .await
            .expect("Failed to connect bridge");
        let host_handle = tokio::spawn(crate::host::serve(
            host_stream,
            Tab::new(Box::new(BuiltinLoader)),
        ));
        wait_until(|| rpc.is_connected()).await;

        let mut client = TestClient::connect(&paths.control).await;
        let url = format!(
            "data:text/html,{}",
            urlencoding::encode("<title>Form</title><button>Submit</button>")
        );
        let response = client
            .send(&Request::new("nav", Method::Navigate, json!({ "url": url })))
            .await;
        assert_eq!(response.id, "nav");
        assert_eq!(response.result.as_ref().unwrap()["title"], "Form");

        let response = client
            .send(&Request::new("snap", Method::Snapshot, json!({})))
            .await;
        let elements = &response.result.unwrap()["elements"];
        assert_eq!(
            elements,
            &json!([{"ref": "e1", "role": "button", "name": "Submit", "states": ""}])
        );

        let response = client
            .send(&Request::new(
                "click",
                Method::Interact,
                json!({"action": "click", "element": {"ref": "e1"}}),
            ))
            .await;
        assert_eq!(response.result.unwrap()["success"], Value::Bool(true));

        server_handle.abort();
        host_handle.abort();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_without_host_calls_fail_with_no_tab() {
        let (dir, paths) = temp_paths("notab");
        let server = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .expect("Failed to bind server");
        let server_handle = tokio::spawn(async move {
            let _ = timeout(Duration::from_secs(5), server.run()).await;
        });

        let mut client = TestClient::connect(&paths.control).await;
        let response = client
            .send(&Request::new("1", Method::Snapshot, json!({})))
            .await;
        assert_eq!(response.id, "1");
        let error = response.error.expect("expected an error");
        assert_eq!(error.code, ErrorCode::NoTab);
        assert!(error.suggestion.is_some());

        server_handle.abort();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_malformed_requests_are_rejected_locally() {
        let (dir, paths) = temp_paths("bad");
        let server = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .expect("Failed to bind server");
        let server_handle = tokio::spawn(async move {
            let _ = timeout(Duration::from_secs(5), server.run()).await;
        });

        let mut client = TestClient::connect(&paths.control).await;

        let response = client.send_line("{not json").await;
        assert_eq!(response.id, "unknown");
        assert_eq!(response.error.unwrap().code, ErrorCode::InvalidRequest);

        let response = client
            .send_line(r#"{"id":"2","method":"reload","params":{}}"#)
            .await;
        assert_eq!(response.id, "2");
        assert_eq!(response.error.unwrap().code, ErrorCode::InvalidRequest);

        // Rejected before the missing host would matter.
        let response = client
            .send_line(r#"{"id":"3","method":"interact","params":{"action":"type"}}"#)
            .await;
        assert_eq!(response.error.unwrap().code, ErrorCode::InvalidRequest);

        server_handle.abort();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_shutdown_request_stops_server() {
        let (dir, paths) = temp_paths("stop");
        let server = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .expect("Failed to bind server");
        let control = paths.control.clone();
        let server_handle = tokio::spawn(async move {
            let result = server.run().await;
            drop(server);
            result
        });

        let mut client = TestClient::connect(&control).await;
        let response = client
            .send_line(r#"{"id":"bye","method":"shutdown"}"#)
            .await;
        assert_eq!(response.result.unwrap()["message"], "Daemon shutting down");
        drop(client);

        timeout(Duration::from_secs(10), server_handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        assert!(!paths.control.exists());
        assert!(!paths.bridge.exists());
        assert!(!paths.pid.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_bind_to_creates_socket_parent_dir() {
        let (dir, _) = temp_paths("nest");
        let paths = SessionPaths::in_dir(&dir.join("nested"), "test");

        let server = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .expect("Failed to bind server");
        assert!(paths.control.exists());
        assert!(paths.bridge.exists());
        assert_eq!(
            std::fs::read_to_string(&paths.pid).unwrap(),
            std::process::id().to_string()
        );

        drop(server);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_second_daemon_is_refused() {
        let (dir, paths) = temp_paths("dup");
        let first = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .expect("Failed to bind server");

        let err = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .err()
            .expect("second bind should fail");
        assert!(err.to_string().contains("already running"));

        drop(first);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_stale_sockets_are_replaced() {
        let (dir, paths) = temp_paths("stale");
        paths.ensure_dir().unwrap();

        // Leave socket files behind with no process attached.
        drop(std::os::unix::net::UnixListener::bind(&paths.control).unwrap());
        drop(std::os::unix::net::UnixListener::bind(&paths.bridge).unwrap());
        std::fs::write(&paths.pid, i32::MAX.to_string()).unwrap();

        let server = DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .expect("stale sockets should be replaced");

        drop(server);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_non_socket_file_is_not_removed() {
        let (dir, paths) = temp_paths("file");
        paths.ensure_dir().unwrap();
        std::fs::write(&paths.control, "not a socket").unwrap();

        assert!(DaemonServer::bind_to(paths.clone(), DEFAULT_CALL_TIMEOUT)
            .await
            .is_err());
        assert_eq!(
            std::fs::read_to_string(&paths.control).unwrap(),
            "not a socket"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
