//! Constructs the fixed Chromium command line (spec §6) and spawns the
//! process with its stderr piped for diagnostics.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use super::argument::{Arg, ArgsBuilder};
use crate::config::Config;
use crate::error::{CdpError, CdpResult};

/// These flags are always passed; they are not user-configurable, per
/// spec §6.
const FIXED_ARGS: &[&str] = &[
    "headless=new",
    "disable-gpu",
    "hide-scrollbars",
    "mute-audio",
    "disable-background-networking",
    "disable-background-timer-throttling",
    "disable-default-apps",
    "disable-extensions",
    "disable-hang-monitor",
    "disable-prompt-on-repost",
    "disable-sync",
    "disable-translate",
    "metrics-recording-only",
    "no-first-run",
    "disable-crash-reporter",
];

/// Builds the argument list for one Chromium instance rooted at
/// `user_data_dir`, honoring `Config::no_sandbox` and
/// `Config::disable_dev_shm_usage`.
fn build_args(config: &Config, user_data_dir: &Path) -> Vec<String> {
    let mut builder = ArgsBuilder::new();
    for flag in FIXED_ARGS {
        builder.arg(Arg::key(*flag));
    }
    builder.arg(Arg::value("remote-debugging-port", "0"));
    builder.arg(Arg::value("user-data-dir", user_data_dir.display()));

    if config.no_sandbox {
        builder.arg(Arg::key("no-sandbox"));
    }
    if config.disable_dev_shm_usage {
        builder.arg(Arg::key("disable-dev-shm-usage"));
    }

    builder.into_iter().collect()
}

/// Locates the Chromium-family executable to launch: an explicit
/// `Config::executable_path` wins, otherwise the first candidate name for
/// `Config::browser_kind` found on `PATH`.
pub fn find_executable(config: &Config) -> CdpResult<std::path::PathBuf> {
    if let Some(path) = &config.executable_path {
        return Ok(path.clone());
    }
    for candidate in config.browser_kind.candidate_names() {
        if let Ok(path) = which::which(candidate) {
            return Ok(path);
        }
    }
    Err(CdpError::ExecutableNotFound(match config.browser_kind {
        crate::config::BrowserKind::Chrome => "chrome",
        crate::config::BrowserKind::Edge => "edge",
    }))
}

/// Launches one Chromium process rooted at `user_data_dir`, with stderr
/// piped so launch failures can include diagnostic output (spec's Open
/// Question on stdout/stderr policy, resolved in SPEC_FULL.md §F.2).
pub fn spawn(config: &Config, user_data_dir: &Path) -> CdpResult<Child> {
    let executable = find_executable(config)?;
    let args = build_args(config, user_data_dir);

    Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(CdpError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn fixed_args_are_always_present() {
        let config = Config::default();
        let args = build_args(&config, Path::new("/tmp/example"));
        for flag in FIXED_ARGS {
            assert!(
                args.iter().any(|a| a == &format!("--{flag}")),
                "missing --{flag} in {args:?}"
            );
        }
        assert!(args.contains(&r#"--remote-debugging-port=0"#.to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-data-dir=")));
    }

    #[test]
    fn no_sandbox_and_dev_shm_flags_are_conditional() {
        let config = Config::default();
        let args = build_args(&config, Path::new("/tmp/example"));
        assert!(!args.iter().any(|a| a == "--no-sandbox"));
        assert!(!args.iter().any(|a| a == "--disable-dev-shm-usage"));

        let config = Config::builder()
            .no_sandbox(true)
            .disable_dev_shm_usage(true)
            .build();
        let args = build_args(&config, Path::new("/tmp/example"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
        assert!(args.iter().any(|a| a == "--disable-dev-shm-usage"));
    }
}
