//! Session management. Load grammers session for the MTP provider.
//!
//! Uses grammers-session's SqliteSession for persistent file-based storage.
//! This service never runs an interactive login: the session file must
//! already be authorized (log in once with a userbot tool), otherwise the
//! wiring skips the MTP provider.

use grammers_session::storages::SqliteSession;
use std::path::Path;

/// Opens a persistent session storage at the given path.
///
/// The file is created if it does not exist; parent directories are created
/// as needed. A fresh file yields an unauthorized session, which the wiring
/// detects and reports.
pub async fn open_file_session(path: impl AsRef<Path>) -> anyhow::Result<SqliteSession> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| anyhow::anyhow!("create session directory: {}", e))?;
    }
    SqliteSession::open(path)
        .await
        .map_err(|e| anyhow::anyhow!("open session file: {}", e))
}
