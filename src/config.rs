//! Process-wide tunables (spec §6) plus, behind the `env-config` feature,
//! loading overrides from environment variables — the ambient
//! configuration plumbing a deployed service needs regardless of which
//! HTTP framework sits on top of it.

use std::path::PathBuf;
use std::time::Duration;

use crate::settings::JsSettings;

/// Which Chromium-family browser to launch, and how to find it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserKind {
    #[default]
    Chrome,
    Edge,
}

impl BrowserKind {
    /// Candidate executable names to probe, in order, per platform. This is
    /// the `FindBrowserExecutable` capability contract from spec §1 — the
    /// core only needs *a* path, discovery of which binary exists is a
    /// platform lookup concern.
    pub fn candidate_names(self) -> &'static [&'static str] {
        match self {
            BrowserKind::Chrome => {
                &["google-chrome-stable", "google-chrome", "chromium", "chromium-browser"]
            }
            BrowserKind::Edge => &["microsoft-edge-stable", "microsoft-edge", "msedge"],
        }
    }
}

/// Process-wide tunables for the browser/page pools, RPC timeouts, and
/// Chromium launch flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_browsers: usize,
    pub max_pages_per_browser: usize,
    pub response_timeout: Duration,
    pub no_sandbox: bool,
    pub disable_dev_shm_usage: bool,
    pub browser_kind: BrowserKind,
    pub executable_path: Option<PathBuf>,
    pub default_js_settings: JsSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_browsers: 4,
            max_pages_per_browser: 10,
            response_timeout: Duration::from_secs(30),
            no_sandbox: false,
            disable_dev_shm_usage: false,
            browser_kind: BrowserKind::Chrome,
            executable_path: None,
            default_js_settings: JsSettings::disabled(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Loads a `Config` starting from defaults and applying `.env`/process
    /// environment overrides, following the same `PDFCAST_`-prefixed
    /// variable convention a deployed instance of this service would use.
    /// Available only with the `env-config` feature, mirroring
    /// `lpfy-html2pdf-api`'s `env-config` feature gate.
    #[cfg(feature = "env-config")]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut builder = Self::builder();

        if let Ok(v) = std::env::var("PDFCAST_MAX_BROWSERS") {
            if let Ok(n) = v.parse() {
                builder = builder.max_browsers(n);
            }
        }
        if let Ok(v) = std::env::var("PDFCAST_MAX_PAGES_PER_BROWSER") {
            if let Ok(n) = v.parse() {
                builder = builder.max_pages_per_browser(n);
            }
        }
        if let Ok(v) = std::env::var("PDFCAST_RESPONSE_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                builder = builder.response_timeout(Duration::from_secs(n));
            }
        }
        if let Ok(v) = std::env::var("PDFCAST_NO_SANDBOX") {
            builder = builder.no_sandbox(parse_bool(&v));
        }
        if let Ok(v) = std::env::var("PDFCAST_DISABLE_DEV_SHM_USAGE") {
            builder = builder.disable_dev_shm_usage(parse_bool(&v));
        }
        if let Ok(v) = std::env::var("PDFCAST_BROWSER_KIND") {
            if v.eq_ignore_ascii_case("edge") {
                builder = builder.browser_kind(BrowserKind::Edge);
            }
        }
        if let Ok(v) = std::env::var("PDFCAST_EXECUTABLE_PATH") {
            builder = builder.executable_path(PathBuf::from(v));
        }

        builder.build()
    }
}

#[cfg(feature = "env-config")]
fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Builder for [`Config`], following the fluent-builder style used
/// throughout the corpus (`BrowserConfigBuilder`, `BrowserPoolConfigBuilder`).
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    inner: ConfigOverrides,
}

#[derive(Debug, Clone, Default)]
struct ConfigOverrides {
    max_browsers: Option<usize>,
    max_pages_per_browser: Option<usize>,
    response_timeout: Option<Duration>,
    no_sandbox: Option<bool>,
    disable_dev_shm_usage: Option<bool>,
    browser_kind: Option<BrowserKind>,
    executable_path: Option<PathBuf>,
    default_js_settings: Option<JsSettings>,
}

impl ConfigBuilder {
    pub fn max_browsers(mut self, n: usize) -> Self {
        self.inner.max_browsers = Some(n);
        self
    }

    pub fn max_pages_per_browser(mut self, n: usize) -> Self {
        self.inner.max_pages_per_browser = Some(n);
        self
    }

    pub fn response_timeout(mut self, d: Duration) -> Self {
        self.inner.response_timeout = Some(d);
        self
    }

    pub fn no_sandbox(mut self, v: bool) -> Self {
        self.inner.no_sandbox = Some(v);
        self
    }

    pub fn disable_dev_shm_usage(mut self, v: bool) -> Self {
        self.inner.disable_dev_shm_usage = Some(v);
        self
    }

    pub fn browser_kind(mut self, kind: BrowserKind) -> Self {
        self.inner.browser_kind = Some(kind);
        self
    }

    pub fn executable_path(mut self, path: PathBuf) -> Self {
        self.inner.executable_path = Some(path);
        self
    }

    pub fn default_js_settings(mut self, settings: JsSettings) -> Self {
        self.inner.default_js_settings = Some(settings);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            max_browsers: self.inner.max_browsers.unwrap_or(defaults.max_browsers),
            max_pages_per_browser: self
                .inner
                .max_pages_per_browser
                .unwrap_or(defaults.max_pages_per_browser),
            response_timeout: self
                .inner
                .response_timeout
                .unwrap_or(defaults.response_timeout),
            no_sandbox: self.inner.no_sandbox.unwrap_or(defaults.no_sandbox),
            disable_dev_shm_usage: self
                .inner
                .disable_dev_shm_usage
                .unwrap_or(defaults.disable_dev_shm_usage),
            browser_kind: self.inner.browser_kind.unwrap_or(defaults.browser_kind),
            executable_path: self.inner.executable_path.or(defaults.executable_path),
            default_js_settings: self
                .inner
                .default_js_settings
                .unwrap_or(defaults.default_js_settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_tunables() {
        let cfg = Config::default();
        assert_eq!(cfg.max_browsers, 4);
        assert_eq!(cfg.max_pages_per_browser, 10);
        assert_eq!(cfg.response_timeout, Duration::from_secs(30));
        assert_eq!(cfg.browser_kind, BrowserKind::Chrome);
        assert_eq!(cfg.default_js_settings.completion_timeout, Duration::from_secs(3));
    }

    #[test]
    fn builder_overrides_only_specified_fields() {
        let cfg = Config::builder().max_browsers(8).no_sandbox(true).build();
        assert_eq!(cfg.max_browsers, 8);
        assert!(cfg.no_sandbox);
        assert_eq!(cfg.max_pages_per_browser, 10);
    }
}
