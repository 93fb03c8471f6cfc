//! C4: one headless-Chromium process, its top-level DevTools connection, and
//! the page pool bound to it.

pub mod argument;
pub mod discovery;
pub mod launch;

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::conn::Connection;
use crate::error::CdpResult;
use crate::page_pool::PagePool;

/// A running headless Chromium instance: its process, its user-data
/// directory, the single multiplexed connection to its browser-level
/// DevTools endpoint, and the page pool scoped to it.
///
/// The child process sits behind a `Mutex` rather than requiring `&mut
/// Browser` so that [`Browser::is_alive`] can be polled through a shared
/// `Arc<Browser>`, as the browser pool holds it.
#[derive(Debug)]
pub struct Browser {
    child: Mutex<tokio::process::Child>,
    user_data_dir: TempDir,
    connection: Connection,
    pages: PagePool,
    endpoint: discovery::DevToolsEndpoint,
}

impl Browser {
    /// Spawns a fresh Chromium process, waits for its `DevToolsActivePort`
    /// handshake, connects to its browser-level endpoint, and constructs the
    /// page pool bound to it (spec §4.4).
    ///
    /// On any failure after the process has been spawned, the child is
    /// killed and its user-data directory is removed before the error is
    /// returned — a half-initialized `Browser` is never observable.
    pub async fn launch(config: &Config) -> CdpResult<Self> {
        let user_data_dir = tempfile::tempdir()?;
        let mut child = launch::spawn(config, user_data_dir.path())?;

        let endpoint = match discovery::discover(user_data_dir.path(), &mut child).await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                discovery::cleanup_user_data_dir(&user_data_dir.path().to_path_buf());
                return Err(err);
            }
        };

        let connection =
            match Connection::connect(&endpoint.browser_ws_url(), config.response_timeout).await {
                Ok(conn) => conn,
                Err(err) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    discovery::cleanup_user_data_dir(&user_data_dir.path().to_path_buf());
                    return Err(err);
                }
            };

        let pages = PagePool::new(config.max_pages_per_browser);

        Ok(Self {
            child: Mutex::new(child),
            user_data_dir,
            connection,
            pages,
            endpoint,
        })
    }

    /// The browser-level DevTools connection, used to open and close page
    /// targets.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn endpoint(&self) -> &discovery::DevToolsEndpoint {
        &self.endpoint
    }

    pub fn pages(&self) -> &PagePool {
        &self.pages
    }

    /// Opens a fresh page target for this browser (`Target.createTarget`
    /// against `about:blank`), returning its target id.
    pub async fn create_target(&self, cancel: &CancellationToken) -> CdpResult<String> {
        let resp = self
            .connection
            .rpc(
                "Target.createTarget",
                serde_json::json!({"url": "about:blank"}),
                cancel,
            )
            .await?;
        let result: crate::wire::CreateTargetResult = resp.into_result("Target.createTarget")?;
        Ok(result.target_id)
    }

    /// Closes a page target. Fire-and-forget: the browser is going to tear
    /// the target down whether or not we observe the acknowledgement.
    pub fn close_target(&self, target_id: &str) -> CdpResult<()> {
        self.connection.fire_and_forget(
            "Target.closeTarget",
            serde_json::json!({"targetId": target_id}),
        )
    }

    /// Whether the underlying process has already exited, e.g. crashed
    /// between renders. Checked by the browser pool before handing this
    /// browser out again (spec §4.7).
    pub async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    pub fn user_data_dir(&self) -> PathBuf {
        self.user_data_dir.path().to_path_buf()
    }

    /// Tears the browser down: disposes the connection, kills the process,
    /// and removes the user-data directory (spec §4.4's shutdown sequence).
    pub async fn shutdown(self) {
        self.connection.dispose().await;
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
        drop(child);
        let path = self.user_data_dir.path().to_path_buf();
        discovery::cleanup_user_data_dir(&path);
    }

    /// Assembles a `Browser` from already-running parts, bypassing
    /// [`Browser::launch`]'s spawn-and-discover sequence. Used by pool and
    /// service tests to exercise pool/admission behavior against a fake
    /// DevTools WebSocket server instead of a real Chromium binary.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_parts(
        child: tokio::process::Child,
        user_data_dir: TempDir,
        connection: Connection,
        max_pages_per_browser: usize,
        endpoint: discovery::DevToolsEndpoint,
    ) -> Self {
        Self {
            child: Mutex::new(child),
            user_data_dir,
            connection,
            pages: PagePool::new(max_pages_per_browser),
            endpoint,
        }
    }
}
