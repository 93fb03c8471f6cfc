//! Concurrent headless-Chromium orchestration core for HTML-to-PDF
//! rendering over the DevTools Protocol.
//!
//! The crate root re-exports the small surface an integrator needs:
//! [`ReportService`] to render, [`Config`] to tune pool sizes and launch
//! flags, [`PageSettings`]/[`JsSettings`] to describe one render, and
//! [`ByteSink`] (plus the two ready-made implementations) as the
//! destination for the produced bytes. Everything else — the wire codec,
//! the connection multiplexer, the pools, the process lifecycle — is
//! `pub(crate)` machinery that exists to make those few types work.

mod base64_stream;
pub mod browser;
mod browser_pool;
mod conn;
pub mod config;
mod error;
mod page;
mod page_pool;
mod service;
pub mod settings;
pub mod sink;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
mod wire;

pub use config::{BrowserKind, Config, ConfigBuilder};
pub use error::{CdpError, CdpResult, ReportError, ReportResult};
pub use page_pool::PoolLimitReached;
pub use service::ReportService;
pub use settings::{JsSettings, Orientation, PageSettings};
pub use sink::{ByteSink, ChannelSink, VecSink};
