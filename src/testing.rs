//! Test-only helpers for exercising the pools and the render pipeline
//! without a real Chromium binary, grounded on `lpfy-html2pdf-api`'s
//! `factory::mock` pattern: a configurable fake standing in for the real
//! resource so pool/retry/saturation behavior can be tested deterministically.
//!
//! Available under `cfg(test)` within this crate and to downstream crates
//! via the `test-utils` feature.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::browser::discovery::DevToolsEndpoint;
use crate::browser::Browser;
use crate::conn::Connection;
use crate::error::CdpResult;

/// Installs a `tracing` subscriber the first time it's called, so test
/// output includes the core's log lines instead of discarding them. Safe to
/// call from every test; only the first call takes effect.
///
/// Relies on `tracing-subscriber`, a dev-dependency, so it's only available
/// in `cfg(test)` builds — not when this module is compiled for downstream
/// use under the `test-utils` feature alone.
#[cfg(test)]
pub fn init_test_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Starts a minimal in-process DevTools-shaped WebSocket server that answers
/// every command with `responder`'s result, or drops the frame (simulating a
/// hung browser) when `responder` returns `None`.
///
/// Returns the bound address; build a `ws://{addr}` URL from it.
pub async fn spawn_fake_devtools_server(
    responder: impl Fn(u64, &str, &Value) -> Option<Value> + Send + Sync + 'static,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let responder = Arc::new(responder);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let responder = responder.clone();
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();
                while let Some(Ok(WsMessage::Text(text))) = read.next().await {
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    let Some(id) = value.get("id").and_then(Value::as_u64) else {
                        continue;
                    };
                    let method = value["method"].as_str().unwrap_or_default().to_string();
                    let params = value["params"].clone();
                    if let Some(result) = responder(id, &method, &params) {
                        let resp = serde_json::json!({"id": id, "result": result});
                        if write.send(WsMessage::Text(resp.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    addr
}

/// A long-lived but inert child process standing in for a Chromium instance,
/// so [`Browser`]'s lifecycle management (kill-on-drop, `is_alive`,
/// `shutdown`) can be exercised without launching a real browser.
fn spawn_placeholder_child() -> tokio::process::Child {
    tokio::process::Command::new("sleep")
        .arg("3600")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("spawning `sleep` for test fixtures")
}

/// Builds a [`Browser`] wired to a fake DevTools server instead of a real
/// Chromium process, via [`Browser::from_parts`].
pub async fn fake_browser(
    responder: impl Fn(u64, &str, &Value) -> Option<Value> + Send + Sync + 'static,
    max_pages_per_browser: usize,
) -> CdpResult<Browser> {
    let addr = spawn_fake_devtools_server(responder).await;
    let child = spawn_placeholder_child();
    let user_data_dir = tempfile::tempdir()?;
    let endpoint = DevToolsEndpoint {
        port: addr.port(),
        path: "/devtools/browser/fake".to_string(),
    };
    let connection = Connection::connect(&endpoint.browser_ws_url(), Duration::from_secs(5)).await?;
    Ok(Browser::from_parts(
        child,
        user_data_dir,
        connection,
        max_pages_per_browser,
        endpoint,
    ))
}

/// A fake DevTools responder implementing just enough of the protocol for
/// [`crate::page::BrowserPage::render`] to complete successfully against a
/// small PDF payload, without touching the JS-readiness path.
pub fn minimal_render_responder(pdf_bytes: &'static [u8]) -> impl Fn(u64, &str, &Value) -> Option<Value> + Send + Sync {
    use std::sync::atomic::{AtomicBool, Ordering};
    let delivered = Arc::new(AtomicBool::new(false));
    move |_id, method, _params| match method {
        "Page.getFrameTree" => Some(serde_json::json!({
            "frameTree": {"frame": {"id": "frame-1"}}
        })),
        "Page.printToPDF" => Some(serde_json::json!({"data": "", "stream": "stream-1"})),
        "IO.read" => {
            if delivered.swap(true, Ordering::SeqCst) {
                Some(serde_json::json!({"data": "", "eof": true, "base64Encoded": true}))
            } else {
                let encoded =
                    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, pdf_bytes);
                Some(serde_json::json!({"data": encoded, "eof": false, "base64Encoded": true}))
            }
        }
        "Target.createTarget" => Some(serde_json::json!({"targetId": "target-1"})),
        _ => Some(serde_json::json!({})),
    }
}
