//! C8: the public report-generation facade.
//!
//! [`ReportService::generate_report`] is the single entry point the rest of
//! the crate exists to support: acquire a browser (shared round-robin, never
//! exclusively checked out), acquire a page on it, run the render pipeline,
//! and return the page to its pool — surfacing every failure as one of the
//! four [`ReportError`] variants (spec §4.8).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser::Browser;
use crate::browser_pool::BrowserPool;
use crate::config::Config;
use crate::error::{ReportError, ReportResult};
use crate::page::BrowserPage;
use crate::settings::{JsSettings, PageSettings};
use crate::sink::ByteSink;

const PAGE_ACQUIRE_RETRIES: u32 = 3;

/// Owns the process-wide browser pool and exposes the one operation
/// integrators call.
pub struct ReportService {
    config: Config,
    browsers: BrowserPool,
}

impl ReportService {
    pub fn new(config: Config) -> Self {
        let browsers = BrowserPool::new(config.clone());
        Self { config, browsers }
    }

    /// Builds a service backed by a pool that creates browsers via
    /// `launcher` instead of spawning real Chromium processes. Used by
    /// integration tests to exercise the full acquire/render/release path
    /// against a fake DevTools server.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn with_launcher(
        config: Config,
        launcher: std::sync::Arc<
            dyn Fn(Config) -> futures::future::BoxFuture<'static, crate::error::CdpResult<Browser>>
                + Send
                + Sync,
        >,
    ) -> Self {
        let browsers = crate::browser_pool::BrowserPool::with_launcher(config.clone(), launcher);
        Self { config, browsers }
    }

    /// Renders `html` to PDF, writing the resulting bytes to `sink`.
    ///
    /// Retries page acquisition up to three times, sleeping
    /// `response_timeout / 3` between attempts and honoring `cancel`
    /// throughout, before surfacing [`ReportError::ServerBusy`] (spec
    /// §4.8's retry/admission algorithm). Browser acquisition is retried
    /// independently inside [`BrowserPool::acquire`].
    pub async fn generate_report(
        &self,
        sink: &mut impl ByteSink,
        html: &str,
        page_settings: &PageSettings,
        js_settings: Option<&JsSettings>,
        cancel: &CancellationToken,
    ) -> ReportResult<()> {
        let js_settings = js_settings.unwrap_or(&self.config.default_js_settings);
        let retry_sleep = self.config.response_timeout / 3;

        let browser = self
            .browsers
            .acquire(cancel)
            .await?
            .ok_or(ReportError::ServerBusy)?;

        // `browser` is already back in the pool's round-robin rotation —
        // many concurrent callers may hold the same one at once, so there is
        // nothing to release here.
        self.render_with_page_retry(&browser, sink, html, page_settings, js_settings, cancel, retry_sleep)
            .await
    }

    /// Retries page acquisition against `browser`'s own pool, independent of
    /// browser-level retries, then dispatches to the render pipeline once a
    /// target id is in hand.
    async fn render_with_page_retry(
        &self,
        browser: &Arc<Browser>,
        sink: &mut impl ByteSink,
        html: &str,
        page_settings: &PageSettings,
        js_settings: &JsSettings,
        cancel: &CancellationToken,
        retry_sleep: Duration,
    ) -> ReportResult<()> {
        for attempt in 0..PAGE_ACQUIRE_RETRIES {
            if cancel.is_cancelled() {
                return Err(ReportError::Cancelled);
            }

            match browser.pages().acquire().await {
                Ok(reused_target_id) => {
                    return self
                        .render_on_page(
                            browser,
                            reused_target_id,
                            sink,
                            html,
                            page_settings,
                            js_settings,
                            cancel,
                        )
                        .await;
                }
                Err(_pool_limit_reached) => {
                    if attempt + 1 == PAGE_ACQUIRE_RETRIES {
                        return Err(ReportError::ServerBusy);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(retry_sleep) => {}
                        _ = cancel.cancelled() => return Err(ReportError::Cancelled),
                    }
                }
            }
        }
        Err(ReportError::ServerBusy)
    }

    /// Resolves a page target (reusing an idle one or opening a fresh tab),
    /// connects its own page-level DevTools connection, runs the render
    /// pipeline, and returns the target to the browser's page pool on every
    /// exit path.
    async fn render_on_page(
        &self,
        browser: &Arc<Browser>,
        reused_target_id: Option<String>,
        sink: &mut impl ByteSink,
        html: &str,
        page_settings: &PageSettings,
        js_settings: &JsSettings,
        cancel: &CancellationToken,
    ) -> ReportResult<()> {
        let target_id = match reused_target_id {
            Some(id) => id,
            None => match browser.create_target(cancel).await {
                Ok(id) => id,
                Err(err) => {
                    // The page pool already reserved this slot; a failed
                    // creation must free it back up rather than leaking it.
                    browser.pages().discard();
                    return Err(err.into());
                }
            },
        };

        let ws_url = browser.endpoint().page_ws_url(&target_id);
        let page = match BrowserPage::connect(
            &ws_url,
            target_id.clone(),
            self.config.response_timeout,
        )
        .await
        {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close_target(&target_id);
                browser.pages().discard();
                return Err(err.into());
            }
        };

        let result = page
            .render(html, page_settings, js_settings, sink, cancel)
            .await;

        // A pipeline error other than a JS-readiness timeout or cancellation
        // means the target may be left in an unknown state (e.g. a crashed
        // renderer) — dispose it rather than handing it back as healthy.
        match &result {
            Ok(()) | Err(ReportError::JsTimeout(_)) | Err(ReportError::Cancelled) => {
                browser.pages().release(target_id).await;
            }
            Err(ReportError::BrowserError(_)) | Err(ReportError::ServerBusy) => {
                let _ = browser.close_target(&target_id);
                browser.pages().discard();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecSink;
    use crate::testing::{fake_browser, minimal_render_responder};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn retry_sleep_divides_response_timeout_evenly() {
        let config = Config::builder()
            .response_timeout(Duration::from_secs(9))
            .build();
        assert_eq!(config.response_timeout / 3, Duration::from_secs(3));
    }

    fn minimal_launcher() -> std::sync::Arc<
        dyn Fn(Config) -> futures::future::BoxFuture<'static, crate::error::CdpResult<Browser>>
            + Send
            + Sync,
    > {
        std::sync::Arc::new(|_config: Config| {
            Box::pin(async move { fake_browser(minimal_render_responder(b"%PDF-1.4 fake"), 4).await })
        })
    }

    #[tokio::test]
    async fn generate_report_streams_bytes_through_a_fresh_target() {
        let service = ReportService::with_launcher(Config::default(), minimal_launcher());
        let mut sink = VecSink::new();
        let cancel = CancellationToken::new();

        service
            .generate_report(&mut sink, "<html></html>", &PageSettings::default(), None, &cancel)
            .await
            .unwrap();

        assert!(!sink.buf.is_empty());
        assert!(sink.completed);
    }

    #[tokio::test]
    async fn cancelled_token_surfaces_as_cancelled_before_acquiring() {
        let service = ReportService::with_launcher(Config::default(), minimal_launcher());
        let mut sink = VecSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .generate_report(&mut sink, "<html></html>", &PageSettings::default(), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Cancelled));
    }

    #[tokio::test]
    async fn failed_target_creation_frees_its_reserved_page_slot() {
        // `Target.createTarget` always replies with a payload missing
        // `targetId`, so creation fails immediately (deserialization error)
        // every time. With a one-page cap, a leaked reservation would make
        // every call after the first fail with `ServerBusy` instead of the
        // same well-defined `BrowserError` — proving the reserved slot is
        // freed back up on failure.
        let launcher: std::sync::Arc<
            dyn Fn(Config) -> futures::future::BoxFuture<'static, crate::error::CdpResult<Browser>>
                + Send
                + Sync,
        > = std::sync::Arc::new(|_config: Config| {
            Box::pin(async move {
                fake_browser(
                    |_id, method, _params| match method {
                        "Target.createTarget" => Some(serde_json::json!({})),
                        _ => Some(serde_json::json!({})),
                    },
                    1,
                )
                .await
            })
        });
        let service = ReportService::with_launcher(Config::default(), launcher);

        for _ in 0..3 {
            let mut sink = VecSink::new();
            let cancel = CancellationToken::new();
            let err = service
                .generate_report(&mut sink, "<html></html>", &PageSettings::default(), None, &cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, ReportError::BrowserError(_)));
        }
    }
}
