//! Discovers a freshly-launched Chromium instance's DevTools WebSocket
//! endpoint by watching for its `DevToolsActivePort` handshake file
//! (spec §4.4).
//!
//! Each browser owns its own watcher instance locally — there is no
//! process-wide mutable state — per the "Global singletons" redesign note
//! in spec §9.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{CdpError, CdpResult};

const HANDSHAKE_FILE: &str = "DevToolsActivePort";
const OVERALL_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_READ_ATTEMPTS: u32 = 5;

/// The two lines of a `DevToolsActivePort` file: a debug port and the
/// browser-level WebSocket path.
#[derive(Debug, Clone)]
pub struct DevToolsEndpoint {
    pub port: u16,
    pub path: String,
}

impl DevToolsEndpoint {
    pub fn browser_ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}{}", self.port, self.path)
    }

    pub fn page_ws_url(&self, target_id: &str) -> String {
        format!("ws://127.0.0.1:{}/devtools/page/{}", self.port, target_id)
    }
}

fn parse_handshake(contents: &str) -> Option<DevToolsEndpoint> {
    let mut lines = contents.lines();
    let port: u16 = lines.next()?.trim().parse().ok()?;
    let path = lines.next()?.trim().to_string();
    if !path.starts_with('/') {
        return None;
    }
    let endpoint = DevToolsEndpoint { port, path };
    // Reject a handshake file whose path can't actually compose into a
    // well-formed ws:// URL, rather than handing a broken URL to
    // `Connection::connect` and failing later with a less specific error.
    url::Url::parse(&endpoint.browser_ws_url()).ok()?;
    Some(endpoint)
}

async fn try_read(path: &Path) -> Option<DevToolsEndpoint> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    // Accept only once at least 2 lines are present, to avoid observing a
    // half-flushed write (spec §4.4 step 3).
    if contents.lines().count() < 2 {
        return None;
    }
    parse_handshake(&contents)
}

/// Waits for `user_data_dir/DevToolsActivePort` to appear and contain a
/// complete two-line handshake, or fails after `OVERALL_TIMEOUT` / if the
/// child process exits first.
///
/// Tolerates the race between process start and file creation: probes once
/// immediately, then watches the directory for create events, retrying the
/// read with exponential backoff against partial writes.
pub async fn discover(
    user_data_dir: &Path,
    child: &mut tokio::process::Child,
) -> CdpResult<DevToolsEndpoint> {
    let handshake_path = user_data_dir.join(HANDSHAKE_FILE);
    let deadline = Instant::now() + OVERALL_TIMEOUT;

    // Step 2: immediate probe in case the file already exists (e.g. a very
    // fast launch, or a unit test pre-seeding the directory).
    if let Some(endpoint) = try_read(&handshake_path).await {
        return Ok(endpoint);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| CdpError::Io(std::io::Error::other(e)))?;
    watcher
        .watch(user_data_dir, RecursiveMode::NonRecursive)
        .map_err(|e| CdpError::Io(std::io::Error::other(e)))?;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CdpError::LaunchTimeout(OVERALL_TIMEOUT));
        }

        tokio::select! {
            exit = child.wait() => {
                let status = exit.map_err(CdpError::from)?;
                return Err(CdpError::LaunchExit(status));
            }
            event = tokio::time::timeout(remaining, rx.recv()) => {
                match event {
                    Err(_) => return Err(CdpError::LaunchTimeout(OVERALL_TIMEOUT)),
                    Ok(None) => return Err(CdpError::LaunchTimeout(OVERALL_TIMEOUT)),
                    Ok(Some(Ok(ev))) => {
                        if !ev.paths.iter().any(|p| p.file_name().map(|n| n == HANDSHAKE_FILE).unwrap_or(false)) {
                            continue;
                        }
                        if let Some(endpoint) = read_with_retry(&handshake_path).await {
                            return Ok(endpoint);
                        }
                    }
                    Ok(Some(Err(_))) => continue,
                }
            }
        }
    }
}

/// Step 3: bounded retry with exponential backoff (100ms * n) against a
/// half-flushed write.
async fn read_with_retry(path: &Path) -> Option<DevToolsEndpoint> {
    for attempt in 1..=MAX_READ_ATTEMPTS {
        if let Some(endpoint) = try_read(path).await {
            return Some(endpoint);
        }
        tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
    }
    try_read(path).await
}

/// Recursively removes a browser's user-data directory on shutdown. A
/// failure here is logged, not propagated — cleanup is best-effort per
/// SPEC_FULL.md §F.
pub fn cleanup_user_data_dir(path: &PathBuf) {
    if let Err(err) = std::fs::remove_dir_all(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove user-data-dir");
        }
    }
}
