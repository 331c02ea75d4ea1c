//! Headless Chromium process management

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

use crate::config::BrowserConfig;
use crate::error::{E2eError, E2eResult};

/// Binary names tried on PATH when no explicit browser is configured
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Handle to a running browser process.
///
/// Owns the throwaway profile directory; dropping the handle kills the
/// process and removes the profile.
pub struct BrowserHandle {
    child: Child,
    ws_url: String,
    _profile: TempDir,
    stderr_task: tokio::task::JoinHandle<()>,
}

impl BrowserHandle {
    /// Launch Chromium with remote debugging on an OS-assigned port and wait
    /// for it to announce its DevTools endpoint.
    pub async fn launch(config: &BrowserConfig, startup_timeout: Duration) -> E2eResult<Self> {
        let binary = find_browser(config)?;
        let profile = tempfile::Builder::new()
            .prefix("plusminus-smoke-profile")
            .tempdir()?;

        info!("Launching {}", binary.display());

        let mut child = Command::new(&binary)
            .args(launch_args(config, profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::BrowserLaunch(format!("Failed to spawn {}: {}", binary.display(), e))
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| E2eError::BrowserLaunch("stderr not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let mut seen = Vec::new();
        let ws_url = tokio::time::timeout(startup_timeout, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(url) = parse_devtools_url(&line) {
                    return Ok(Some(url));
                }
                trace!("chromium: {}", line);
                seen.push(line);
            }
            Ok::<_, std::io::Error>(None)
        })
        .await
        .map_err(|_| E2eError::Timeout("browser DevTools endpoint".to_string()))??;

        let Some(ws_url) = ws_url else {
            return Err(E2eError::BrowserLaunch(format!(
                "{} exited before opening DevTools:\n{}",
                binary.display(),
                seen.join("\n")
            )));
        };

        // Keep draining stderr so the browser never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("chromium: {}", line);
            }
        });

        debug!("Browser DevTools at {}", ws_url);

        Ok(Self {
            child,
            ws_url,
            _profile: profile,
            stderr_task,
        })
    }

    /// Browser-level DevTools WebSocket URL
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Stop the browser, politely first
    pub async fn stop(&mut self) -> E2eResult<()> {
        if let Some(pid) = self.child.id() {
            info!("Stopping browser (pid: {})", pid);
            terminate(pid);
            if tokio::time::timeout(Duration::from_secs(2), self.child.wait())
                .await
                .is_ok()
            {
                return Ok(());
            }
            warn!("Browser ignored SIGTERM, killing");
        }
        self.child.kill().await?;
        Ok(())
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.stderr_task.abort();
        if let Some(pid) = self.child.id() {
            terminate(pid);
        }
        let _ = self.child.start_kill();
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}

/// Command line for a throwaway, automation-friendly browser
fn launch_args(config: &BrowserConfig, profile: &Path) -> Vec<String> {
    let mut args = vec![
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", profile.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-extensions".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--no-sandbox".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args.extend(config.args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// Extract the WebSocket URL from Chromium's startup banner
fn parse_devtools_url(line: &str) -> Option<String> {
    static DEVTOOLS_RE: OnceLock<Regex> = OnceLock::new();
    let re = DEVTOOLS_RE
        .get_or_init(|| Regex::new(r"DevTools listening on (ws://\S+)").expect("valid regex"));
    re.captures(line).map(|caps| caps[1].to_string())
}

/// Resolve the browser binary: explicit config first, then PATH
pub fn find_browser(config: &BrowserConfig) -> E2eResult<PathBuf> {
    find_browser_in(config, std::env::var_os("PATH"))
}

/// Like [`find_browser`], searching `paths` instead of the process PATH.
/// Only executable files count.
fn find_browser_in(config: &BrowserConfig, paths: Option<OsString>) -> E2eResult<PathBuf> {
    let cwd = std::env::current_dir()?;

    if let Some(binary) = &config.binary {
        return which::which_in(binary, paths.as_ref(), &cwd).map_err(|e| {
            E2eError::BrowserLaunch(format!("Browser not found: {} ({})", binary.display(), e))
        });
    }

    BROWSER_CANDIDATES
        .iter()
        .find_map(|name| which::which_in(name, paths.as_ref(), &cwd).ok())
        .ok_or(E2eError::BrowserNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devtools_url() {
        let line = "\nDevTools listening on ws://127.0.0.1:38211/devtools/browser/5b1c-77";
        assert_eq!(
            parse_devtools_url(line).as_deref(),
            Some("ws://127.0.0.1:38211/devtools/browser/5b1c-77")
        );
        assert!(parse_devtools_url("[0101/000000.000:ERROR:gpu_init.cc] oops").is_none());
    }

    #[test]
    fn test_launch_args_headless_and_extra() {
        let config = BrowserConfig {
            binary: None,
            headless: true,
            args: vec!["--lang=ro".to_string()],
        };
        let args = launch_args(&config, Path::new("/tmp/profile"));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--lang=ro".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));

        let headed = BrowserConfig {
            headless: false,
            ..config
        };
        assert!(!launch_args(&headed, Path::new("/tmp/p"))
            .iter()
            .any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_missing_explicit_binary_is_reported() {
        let config = BrowserConfig {
            binary: Some(PathBuf::from("/definitely/not/here/chromium")),
            ..Default::default()
        };
        assert!(matches!(
            find_browser(&config),
            Err(E2eError::BrowserLaunch(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_candidate_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let chromium = dir.path().join("chromium");
        std::fs::write(&chromium, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&chromium, std::fs::Permissions::from_mode(0o644)).unwrap();

        let paths = Some(dir.path().as_os_str().to_os_string());
        assert!(matches!(
            find_browser_in(&BrowserConfig::default(), paths.clone()),
            Err(E2eError::BrowserNotFound)
        ));

        let explicit = BrowserConfig {
            binary: Some(chromium.clone()),
            ..Default::default()
        };
        assert!(matches!(
            find_browser_in(&explicit, paths.clone()),
            Err(E2eError::BrowserLaunch(_))
        ));

        std::fs::set_permissions(&chromium, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(
            find_browser_in(&BrowserConfig::default(), paths).unwrap(),
            chromium
        );
    }
}
