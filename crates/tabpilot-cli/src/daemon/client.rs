//! Connecting to the daemon, starting it when needed.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tabpilot_core::protocol::{Request, Response};
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::daemon::paths::SessionPaths;
use crate::daemon::wire;

/// Maximum time to wait for a freshly spawned daemon to listen.
const DAEMON_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between socket connection attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How long a client waits for its answer. Longer than the daemon's default
/// per-call timeout so that a `TIMEOUT` error can reach the caller.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(35);

/// Connect to `socket`, spawning `tabpilot daemon` first if nothing listens.
///
/// Both CLI clients (control socket) and the page host (bridge socket) come
/// through here.
pub async fn connect_or_start(socket: &Path) -> Result<UnixStream> {
    if let Ok(stream) = UnixStream::connect(socket).await {
        debug!("Connected to existing daemon at {:?}", socket);
        return Ok(stream);
    }

    info!("Daemon not running, starting...");
    let child = start_daemon()?;
    wait_for_daemon(socket, child).await
}

/// Start the daemon as a detached background process.
///
/// The child handle is returned so an early crash is noticed quickly.
fn start_daemon() -> Result<std::process::Child> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("Failed to get current executable path")?;

    // A new process group keeps the daemon alive when the terminal closes.
    std::process::Command::new(exe)
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .context("Failed to spawn daemon process")
}

async fn wait_for_daemon(socket: &Path, mut child: std::process::Child) -> Result<UnixStream> {
    let start = std::time::Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => bail!(
                "Daemon exited immediately with status: {} (run 'tabpilot daemon' directly to diagnose)",
                status
            ),
            Ok(None) => {}
            Err(e) => debug!("Error checking daemon status: {}", e),
        }

        match UnixStream::connect(socket).await {
            Ok(stream) => {
                info!("Connected to daemon after {:?}", start.elapsed());
                return Ok(stream);
            }
            Err(_) if start.elapsed() > DAEMON_STARTUP_TIMEOUT => {
                bail!("Daemon failed to start within {:?}", DAEMON_STARTUP_TIMEOUT);
            }
            Err(_) => tokio::time::sleep(RETRY_INTERVAL).await,
        }
    }
}

/// A CLI connection to the daemon's control socket.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DaemonClient {
    /// Connect to the session's daemon, starting it if necessary.
    pub async fn connect() -> Result<Self> {
        let paths = SessionPaths::from_env();
        let stream = connect_or_start(&paths.control).await?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn request(&mut self, request: Request) -> Result<Response> {
        self.request_with_timeout(request, CLIENT_TIMEOUT).await
    }

    pub async fn request_with_timeout(
        &mut self,
        request: Request,
        timeout_duration: Duration,
    ) -> Result<Response> {
        debug!("Sending {} request {}", request.method, request.id);
        wire::write_message(&mut self.writer, &request).await?;

        let mut line = String::new();
        let bytes_read = timeout(timeout_duration, wire::read_line(&mut self.reader, &mut line))
            .await
            .context("Request timed out")??;

        if bytes_read == 0 {
            bail!("Daemon closed connection unexpectedly");
        }

        debug!("Received: {}", line.trim());
        serde_json::from_str(&line).context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::paths::SessionPaths;
    use crate::daemon::DaemonServer;
    use serde_json::json;
    use tabpilot_core::error::ErrorCode;
    use tabpilot_core::protocol::Method;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_client_talks_to_running_daemon() {
        let short_id = Uuid::new_v4().simple().to_string();
        let dir = std::path::PathBuf::from("/tmp").join(format!("tp-client-{}", &short_id[..8]));
        let paths = SessionPaths::in_dir(&dir, "test");

        let server = DaemonServer::bind_to(paths.clone(), Duration::from_secs(1))
            .await
            .expect("Failed to bind server");
        let server_handle = tokio::spawn(async move {
            let _ = timeout(Duration::from_secs(5), server.run()).await;
        });

        // Connect directly; the temp socket would not be found by auto-start.
        let stream = UnixStream::connect(&paths.control)
            .await
            .expect("Failed to connect");
        let mut client = DaemonClient::from_stream(stream);

        // No page host is attached yet.
        let request = Request::new("client-test-1", Method::Snapshot, json!({}));
        let response = client.request(request).await.expect("Request failed");
        assert_eq!(response.id, "client-test-1");
        assert_eq!(response.error.map(|e| e.code), Some(ErrorCode::NoTab));

        // The same connection serves further requests.
        let request = Request::new("client-test-2", Method::Console, json!({}));
        let response = client.request(request).await.expect("Request failed");
        assert_eq!(response.id, "client-test-2");

        server_handle.abort();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_wait_for_daemon_reports_early_exit() {
        let socket = std::path::PathBuf::from("/tmp/tp-never-listens.sock");
        let child = std::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let err = wait_for_daemon(&socket, child).await.unwrap_err();
        assert!(err.to_string().contains("exited immediately"));
    }
}
