//! C5: the render pipeline run against one page target.
//!
//! `render` drives the fixed seven-step sequence from spec §4.5: disable
//! cache, resolve the frame tree, inject the document, optionally wait for a
//! JS readiness signal, print to PDF as a stream, and pump that stream into
//! a [`ByteSink`] via `IO.read`, closing the stream handle on every exit
//! path.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::base64_stream::StreamDecoder;
use crate::conn::Connection;
use crate::error::{CdpError, CdpResult, ReportError, ReportResult};
use crate::settings::{JsSettings, PageSettings};
use crate::sink::ByteSink;
use crate::wire::{EvaluateResult, FrameTreeResult, IoReadResult, PrintToPdfResult};

/// Chunk size for each `IO.read` call, fixed by the wire protocol (spec §6).
const IO_READ_CHUNK_SIZE: u32 = 51200;

/// A single browser tab: its own DevTools connection, bound to one target's
/// page-level WebSocket endpoint.
#[derive(Debug)]
pub struct BrowserPage {
    connection: Connection,
    target_id: String,
}

impl BrowserPage {
    /// Connects to the page-level DevTools endpoint for `target_id`.
    pub async fn connect(
        ws_url: &str,
        target_id: String,
        response_timeout: Duration,
    ) -> CdpResult<Self> {
        let connection = Connection::connect(ws_url, response_timeout).await?;
        Ok(Self {
            connection,
            target_id,
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Runs the full render pipeline, writing the resulting PDF bytes to
    /// `sink` as they arrive.
    ///
    /// Surfaces [`ReportError::JsTimeout`] only when `js_settings` requested
    /// a wait and the readiness signal never fired within its window; every
    /// other transport/protocol failure surfaces as `ReportError::BrowserError`
    /// via the blanket `From<CdpError>` conversion, and cooperative
    /// cancellation surfaces as `ReportError::Cancelled`.
    pub async fn render(
        &self,
        html: &str,
        page_settings: &PageSettings,
        js_settings: &JsSettings,
        sink: &mut impl ByteSink,
        cancel: &CancellationToken,
    ) -> ReportResult<()> {
        // Step 1: disable cache. Fire-and-forget — nothing downstream
        // depends on its acknowledgement.
        self.connection
            .fire_and_forget("Network.setCacheDisabled", serde_json::json!({"cacheDisabled": true}))?;

        // Step 2: resolve the frame tree to get the target frame id that
        // `Page.setDocumentContent` needs.
        let resp = self
            .connection
            .rpc("Page.getFrameTree", serde_json::json!({}), cancel)
            .await?;
        let frame_tree: FrameTreeResult = resp.into_result("Page.getFrameTree")?;
        let frame_id = frame_tree.frame_tree.frame.id;

        // Step 3: inject the document. Fire-and-forget, matching the
        // design's treatment of this as a one-way command.
        self.connection.fire_and_forget(
            "Page.setDocumentContent",
            serde_json::json!({"frameId": frame_id, "html": html}),
        )?;

        // Step 4: optional JS-readiness wait, with its own timeout distinct
        // from the connection's default response timeout.
        if js_settings.wait_for_completion {
            self.wait_for_js_ready(js_settings, cancel).await?;
        }

        // Step 5: print to PDF as a stream.
        let resp = self
            .connection
            .rpc("Page.printToPDF", page_settings.to_print_params(), cancel)
            .await?;
        let print_result: PrintToPdfResult = resp.into_result("Page.printToPDF")?;
        let stream_handle = match print_result.stream {
            Some(handle) if !handle.is_empty() => handle,
            // No stream handle (absent or empty): finish successfully with
            // no output rather than treating this as an error.
            _ => {
                sink.complete().await;
                return Ok(());
            }
        };

        // Step 6: pump the stream through IO.read into the sink, honoring
        // both cooperative cancellation and the sink's own stop signal.
        let pump_result = self.pump_stream(&stream_handle, sink, cancel).await;

        // Step 6 (continued): IO.close on every exit path, regardless of
        // how the pump loop ended.
        let _ = self
            .connection
            .fire_and_forget("IO.close", serde_json::json!({"handle": stream_handle}));

        pump_result?;

        // Step 7: signal completion to the sink.
        sink.complete().await;
        Ok(())
    }

    async fn wait_for_js_ready(
        &self,
        js_settings: &JsSettings,
        cancel: &CancellationToken,
    ) -> ReportResult<()> {
        // The expression's own internal deadline already bounds the wait;
        // the RPC timeout is padded slightly so the call itself doesn't
        // race the in-page polling loop's `resolve('timeout')`.
        let rpc_timeout = js_settings.completion_timeout + Duration::from_millis(500);
        let resp = self
            .connection
            .rpc_with_timeout(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": js_settings.readiness_expression(),
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
                rpc_timeout,
                cancel,
            )
            .await?;
        let evaluated: EvaluateResult = resp.into_result("Runtime.evaluate")?;
        if evaluated.was_thrown {
            return Err(ReportError::BrowserError(CdpError::UnexpectedResponse {
                method: "Runtime.evaluate",
                detail: evaluated
                    .result
                    .description
                    .unwrap_or_else(|| "readiness expression threw".to_string()),
            }));
        }
        let signal = evaluated
            .result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or("timeout");
        if signal == "timeout" {
            return Err(ReportError::JsTimeout(js_settings.completion_timeout));
        }
        Ok(())
    }

    async fn pump_stream(
        &self,
        stream_handle: &str,
        sink: &mut impl ByteSink,
        cancel: &CancellationToken,
    ) -> ReportResult<()> {
        let mut decoder = StreamDecoder::new();
        loop {
            if sink.stopped() || cancel.is_cancelled() {
                return Err(ReportError::Cancelled);
            }
            let resp = self
                .connection
                .rpc(
                    "IO.read",
                    serde_json::json!({"handle": stream_handle, "size": IO_READ_CHUNK_SIZE}),
                    cancel,
                )
                .await?;
            let read: IoReadResult = resp.into_result("IO.read")?;

            if read.base64_encoded {
                let bytes = decoder
                    .push_owned(read.data.as_bytes())
                    .map_err(ReportError::from)?;
                if !bytes.is_empty() {
                    sink.write(bytes).await;
                }
            } else if !read.data.is_empty() {
                sink.write(read.data.into_bytes()).await;
            }

            if read.eof {
                return Ok(());
            }
        }
    }
}
