//! Error types for the rendering core.
//!
//! Two tiers mirror the split between wire/process failures and the
//! caller-facing outcome described in the design: [`CdpError`] covers
//! transport, decode and process-launch failures; [`ReportError`] is the
//! exhaustive outcome of [`crate::service::ReportService::generate_report`].

use std::time::Duration;

/// Low-level failures from the DevTools wire protocol, the WebSocket
/// transport, or the Chromium process itself.
#[derive(Debug, thiserror::Error)]
pub enum CdpError {
    /// The WebSocket transport returned an error or closed unexpectedly.
    #[error("websocket transport error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// An I/O error occurred spawning or communicating with the browser
    /// process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A CDP frame could not be encoded or decoded as JSON.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A call did not receive a response within its deadline.
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's context was cancelled before the call completed.
    #[error("call was cancelled")]
    Cancelled,

    /// The `Connection` has been disposed; no further calls can be made.
    #[error("connection is closed")]
    Closed,

    /// The base64 stream decoder encountered malformed input.
    #[error("malformed base64 input: {0}")]
    Decode(String),

    /// Chromium did not publish a `DevToolsActivePort` handshake file before
    /// the overall launch timeout elapsed.
    #[error("timed out waiting for DevToolsActivePort after {0:?}")]
    LaunchTimeout(Duration),

    /// The Chromium process exited before completing its handshake.
    #[error("browser process exited during launch with status {0}")]
    LaunchExit(std::process::ExitStatus),

    /// No suitable browser executable could be located.
    #[error("could not locate a {0} executable")]
    ExecutableNotFound(&'static str),

    /// A CDP command returned a JSON-RPC style error object.
    #[error("cdp error {code}: {message}")]
    Protocol {
        /// Numeric CDP error code.
        code: i64,
        /// Human-readable message from Chromium.
        message: String,
    },

    /// A response carried a payload shape the caller didn't expect.
    #[error("unexpected response for {method}: {detail}")]
    UnexpectedResponse {
        /// CDP method whose response failed to parse.
        method: &'static str,
        /// What went wrong decoding it.
        detail: String,
    },
}

pub type CdpResult<T> = std::result::Result<T, CdpError>;

/// The outcome of a single `GenerateReport` call, matching the taxonomy in
/// the design: every non-success path is a distinct, matchable variant
/// rather than a thrown exception.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Pool caps were hit and retries were exhausted. Callers should surface
    /// this as a 503 at the HTTP boundary.
    #[error("server is busy: all browsers/pages are saturated")]
    ServerBusy,

    /// The caller's context ended before the render completed.
    #[error("request was cancelled")]
    Cancelled,

    /// A non-recoverable protocol, deserialization, or process-level
    /// failure.
    #[error("browser error: {0}")]
    BrowserError(#[source] CdpError),

    /// The JS completion signal was not observed within its configured
    /// window.
    #[error("timed out waiting for JS completion signal after {0:?}")]
    JsTimeout(Duration),
}

pub type ReportResult<T> = std::result::Result<T, ReportError>;

impl From<CdpError> for ReportError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::Cancelled => ReportError::Cancelled,
            other => ReportError::BrowserError(other),
        }
    }
}
