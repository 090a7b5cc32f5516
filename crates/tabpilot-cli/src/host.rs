//! The page host: owns one [`Tab`] and serves the daemon's requests for it.
//!
//! The host connects to the daemon's bridge socket and answers one request at
//! a time. Interactions wait out their settle delay here, between
//! [`Tab::begin`] and [`Tab::finish`].

use anyhow::{anyhow, Result};
use tabpilot_core::interact::SETTLE_DELAY;
use tabpilot_core::protocol::{Command, Request, Response};
use tabpilot_core::tab::{BuiltinLoader, Step, Tab};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

use crate::daemon::client::connect_or_start;
use crate::daemon::paths::SessionPaths;
use crate::daemon::wire;

/// Connect to the session's daemon and serve a fresh tab until it hangs up.
pub async fn run_host(url: Option<String>) -> Result<()> {
    let paths = SessionPaths::from_env();
    let mut tab = Tab::new(Box::new(BuiltinLoader));

    if let Some(url) = url {
        let loaded = tab
            .navigate(&url)
            .map_err(|e| anyhow!("Failed to open {}: {}", url, e))?;
        info!("Opened {} ({})", loaded.url, loaded.title);
    }

    let stream = connect_or_start(&paths.bridge).await?;
    info!("Page host attached to {:?}", paths.bridge);
    serve(stream, tab).await
}

/// Answer requests arriving on `stream` until EOF.
pub async fn serve<S>(stream: S, mut tab: Tab) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if wire::read_line(&mut reader, &mut line).await? == 0 {
            info!("Daemon closed the connection");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => request,
            Err(e) => {
                // Without an id there is nobody to answer.
                warn!("Ignoring malformed request: {}", e);
                continue;
            }
        };

        let response = handle_request(&mut tab, request).await;
        wire::write_message(&mut writer, &response).await?;
    }
}

async fn handle_request(tab: &mut Tab, request: Request) -> Response {
    debug!("Handling {} request {}", request.method, request.id);

    let outcome = match Command::from_request(&request).and_then(|command| tab.begin(command)) {
        Ok(Step::Done(value)) => Ok(value),
        Ok(Step::Settle(pending)) => {
            tokio::time::sleep(SETTLE_DELAY).await;
            Ok(tab.finish(pending))
        }
        Err(e) => Err(e),
    };

    Response::from_result(request.id, outcome)
}
