//! C7: the process-wide browser pool.
//!
//! A bounded set of live [`Browser`] instances, reused round-robin with no
//! per-browser "busy" flag — a single browser may serve many concurrent
//! requests at once, bounded only by its own
//! [`crate::page_pool::PagePool`] (spec §4.7). `acquire` dequeues a browser
//! and immediately re-enqueues it so the next caller can dispatch against it
//! too, rather than checking it out exclusively. Admission is a dual gate:
//! spawn a fresh browser while under `max_browsers`, or wait on a semaphore
//! permit and retry against the existing set once one frees up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::browser::Browser;
use crate::config::Config;
use crate::error::{CdpError, CdpResult};

const ACQUIRE_RETRIES: u32 = 3;
const ACQUIRE_RETRY_SLEEP: Duration = Duration::from_secs(5);
const ACQUIRE_RETRY_JITTER_MILLIS: u64 = 500;

/// Adds a small random jitter to the retry sleep so a burst of callers that
/// all hit saturation at once don't wake up and retry in lockstep.
fn jittered_retry_sleep() -> Duration {
    ACQUIRE_RETRY_SLEEP + Duration::from_millis(rand::random::<u64>() % ACQUIRE_RETRY_JITTER_MILLIS)
}

/// How a fresh browser gets created. Defaults to [`Browser::launch`]; tests
/// substitute a launcher that connects to a fake DevTools server instead of
/// spawning a real Chromium process, following `lpfy-html2pdf-api`'s
/// injectable-`BrowserFactory` pattern.
type Launcher = dyn Fn(Config) -> BoxFuture<'static, CdpResult<Browser>> + Send + Sync;

struct Inner {
    /// Every currently-live browser, in round-robin dispatch order. A
    /// browser stays here continuously between spawn and death — `acquire`
    /// hands out a clone and puts it straight back, it is never removed
    /// just because a caller is using it.
    live: VecDeque<Arc<Browser>>,
}

/// Bounded pool of live browsers, shared across every concurrent render
/// request.
pub struct BrowserPool {
    config: Config,
    launcher: Arc<Launcher>,
    inner: Mutex<Inner>,
    /// One permit per live-or-being-spawned browser slot.
    admission: Semaphore,
    /// Serializes the spawn path so two callers racing to fill the last
    /// slot don't both spawn (spec's lock ordering: start-lock before
    /// queue).
    start_lock: Mutex<()>,
}

impl BrowserPool {
    pub fn new(config: Config) -> Self {
        Self::with_launcher(config, Arc::new(|config: Config| {
            Box::pin(async move { Browser::launch(&config).await })
        }))
    }

    /// Builds a pool that creates browsers via `launcher` instead of
    /// [`Browser::launch`]. Exposed for pool/retry/saturation tests that
    /// need to run without a real Chromium binary.
    pub fn with_launcher(config: Config, launcher: Arc<Launcher>) -> Self {
        let max_browsers = config.max_browsers;
        Self {
            config,
            launcher,
            inner: Mutex::new(Inner {
                live: VecDeque::new(),
            }),
            admission: Semaphore::new(max_browsers),
            start_lock: Mutex::new(()),
        }
    }

    /// Acquires a browser for the caller to dispatch one request against.
    /// The returned `Arc<Browser>` is already back in the round-robin
    /// rotation by the time this returns — there is no matching "release"
    /// to call afterwards; many callers may hold the same browser at once.
    /// Retries a bounded number of times against transient saturation.
    /// Exhaustion is surfaced as `Ok(None)` — the service layer maps that to
    /// `ReportError::ServerBusy`.
    pub async fn acquire(&self, cancel: &CancellationToken) -> CdpResult<Option<Arc<Browser>>> {
        for attempt in 0..ACQUIRE_RETRIES {
            if cancel.is_cancelled() {
                return Err(CdpError::Cancelled);
            }
            match self.try_acquire_once(cancel).await? {
                Some(browser) => return Ok(Some(browser)),
                None => {
                    if attempt + 1 == ACQUIRE_RETRIES {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(jittered_retry_sleep()) => {}
                        _ = cancel.cancelled() => return Err(CdpError::Cancelled),
                    }
                }
            }
        }
        Ok(None)
    }

    async fn try_acquire_once(&self, cancel: &CancellationToken) -> CdpResult<Option<Arc<Browser>>> {
        // Round-robin over the existing live set, discarding any browser
        // found dead along the way and freeing its admission slot.
        loop {
            let candidate = self.inner.lock().await.live.pop_front();
            let Some(browser) = candidate else {
                break;
            };
            if browser.is_alive().await {
                self.inner.lock().await.live.push_back(browser.clone());
                return Ok(Some(browser));
            }
            self.admission.add_permits(1);
        }

        // No live browsers left to reuse — spawn under the cap, serialized
        // by `start_lock` so two racing callers don't both spawn into the
        // same reserved slot.
        let permit = match self.admission.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        };

        if !permit {
            return Ok(None);
        }

        let _guard = self.start_lock.lock().await;
        match (self.launcher)(self.config.clone()).await {
            Ok(browser) => {
                let browser = Arc::new(browser);
                self.inner.lock().await.live.push_back(browser.clone());
                Ok(Some(browser))
            }
            Err(err) => {
                self.admission.add_permits(1);
                if matches!(err, CdpError::Cancelled) && cancel.is_cancelled() {
                    Err(CdpError::Cancelled)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn outstanding_permits(&self) -> usize {
        self.admission.available_permits()
    }
}
