//! Where a session's sockets live.
//!
//! Socket directory, first match wins:
//! 1. `TABPILOT_SOCKET_DIR`
//! 2. `XDG_RUNTIME_DIR/tabpilot`
//! 3. `~/.tabpilot`
//! 4. `{temp}/tabpilot`
//!
//! A session (`TABPILOT_SESSION`, default `default`) owns three files in that
//! directory: `{session}.sock` for CLI clients, `{session}.bridge.sock` for the
//! page host and `{session}.pid`.

use std::env;
use std::path::{Path, PathBuf};

const SESSION_VAR: &str = "TABPILOT_SESSION";
const SOCKET_DIR_VAR: &str = "TABPILOT_SOCKET_DIR";
const DEFAULT_SESSION: &str = "default";

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Session name from the environment, sanitized.
pub fn session_name() -> String {
    let raw = non_empty_var(SESSION_VAR).unwrap_or_else(|| DEFAULT_SESSION.to_string());
    sanitize_session_name(&raw)
}

pub fn socket_dir() -> PathBuf {
    if let Some(dir) = non_empty_var(SOCKET_DIR_VAR) {
        return PathBuf::from(dir);
    }
    if let Some(runtime_dir) = non_empty_var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("tabpilot");
    }
    match dirs::home_dir() {
        Some(home) => home.join(".tabpilot"),
        None => env::temp_dir().join("tabpilot"),
    }
}

/// Session names become file names, so only `[A-Za-z0-9_-]` is allowed and a
/// leading hyphen is refused. Anything else falls back to `default`.
pub(crate) fn sanitize_session_name(name: &str) -> String {
    let is_valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if is_valid {
        name.to_string()
    } else {
        tracing::warn!(
            "Invalid session name '{}', using '{}'. Names may only contain letters, digits, '-' and '_'.",
            name,
            DEFAULT_SESSION
        );
        DEFAULT_SESSION.to_string()
    }
}

/// The files belonging to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub control: PathBuf,
    pub bridge: PathBuf,
    pub pid: PathBuf,
}

impl SessionPaths {
    /// Paths for the session named by the environment.
    pub fn from_env() -> Self {
        Self::in_dir(&socket_dir(), &session_name())
    }

    /// Paths for `session` under `dir`. The name is sanitized.
    pub fn in_dir(dir: &Path, session: &str) -> Self {
        let session = sanitize_session_name(session);
        Self {
            control: dir.join(format!("{}.sock", session)),
            bridge: dir.join(format!("{}.bridge.sock", session)),
            pid: dir.join(format!("{}.pid", session)),
        }
    }

    /// Create the directory holding these files, private to the user.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        let Some(dir) = self.control.parent() else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}
