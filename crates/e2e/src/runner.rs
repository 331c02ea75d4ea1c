//! Smoke runner that orchestrates server, browser and scenario

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::browser::BrowserHandle;
use crate::cdp::CdpClient;
use crate::config::SmokeConfig;
use crate::error::{E2eError, E2eResult};
use crate::inline_js;
use crate::page::Page;
use crate::reporter::{FailureReporter, RunResult};
use crate::scenario::Scenario;
use crate::server::PageServer;

const MODULE_INDEX: &str = "index.html";

/// Find the page directory below `root`: the first of `dirs` that holds an
/// `index.html`. Matching is case-sensitive.
pub fn locate_module(root: &Path, dirs: &[String]) -> E2eResult<String> {
    dirs.iter()
        .find(|dir| root.join(dir).join(MODULE_INDEX).is_file())
        .cloned()
        .ok_or_else(|| {
            let expected = dirs
                .iter()
                .map(|d| format!("{}/{}", d, MODULE_INDEX))
                .collect::<Vec<_>>()
                .join(" or ");
            E2eError::Precondition(format!(
                "Module not found in {}: expected {}",
                root.display(),
                expected
            ))
        })
}

/// Main smoke runner
pub struct SmokeRunner {
    root: PathBuf,
    config: SmokeConfig,
}

impl SmokeRunner {
    pub fn new(root: impl Into<PathBuf>, config: SmokeConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn config(&self) -> &SmokeConfig {
        &self.config
    }

    /// HTML files whose inline scripts get compiled: the configured ones
    /// plus the module page, without duplicates
    pub fn inline_script_files(&self, module_dir: &str) -> Vec<String> {
        let mut files = self.config.inline_script_pages.clone();
        let module_page = format!("{}/{}", module_dir, MODULE_INDEX);
        if !files.contains(&module_page) {
            files.push(module_page);
        }
        files
    }

    /// Run the whole smoke test. Every failure ends up in the result.
    pub async fn run(&self) -> RunResult {
        let start = Instant::now();
        let mut result = RunResult::default();

        if let Err(e) = self.run_inner(&mut result).await {
            error!("Smoke run aborted: {}", e);
            result.record(e);
        }

        info!(
            "Smoke run finished in {} ms with {} failure(s)",
            start.elapsed().as_millis(),
            result.failures.len()
        );
        result
    }

    async fn run_inner(&self, result: &mut RunResult) -> E2eResult<()> {
        let module = locate_module(&self.root, &self.config.module_dirs)?;
        info!("Testing module /{}/", module);

        let server = PageServer::start(&self.root, self.config.timeouts.server_ready()).await?;
        let outcome = self.run_browser(&server, &module, result).await;

        if let Err(e) = server.stop().await {
            warn!("Server did not stop cleanly: {}", e);
        }
        outcome
    }

    async fn run_browser(
        &self,
        server: &PageServer,
        module: &str,
        result: &mut RunResult,
    ) -> E2eResult<()> {
        let mut browser =
            BrowserHandle::launch(&self.config.browser, self.config.timeouts.browser_start())
                .await?;
        let (client, events) = CdpClient::connect(browser.ws_url()).await?;
        let session = client.new_page().await?;
        let mut reporter = FailureReporter::new(events, Some(session.session_id().to_string()));
        let page = Page::new(session);

        if let Err(e) = self.drive(&page, &mut reporter, server, module, result).await {
            error!("{}", e);
            result.record(e);
        }

        // Whatever is still queued belongs in the diagnostics.
        result.extend_signals(reporter.drain());

        if let Err(e) = client.close_browser().await {
            debug!("Browser.close failed: {}", e);
        }
        drop(client);
        browser.stop().await?;
        Ok(())
    }

    async fn drive(
        &self,
        page: &Page,
        reporter: &mut FailureReporter,
        server: &PageServer,
        module: &str,
        result: &mut RunResult,
    ) -> E2eResult<()> {
        let files = self.inline_script_files(module);
        let failures = inline_js::check_pages(page.session(), &self.root, &files).await?;
        if !failures.is_empty() {
            for failure in failures {
                error!("{}", failure);
                result.push(failure);
            }
            return Ok(());
        }

        let url = server.page_url(module);
        page.goto(&url, self.config.timeouts.element()).await?;
        reporter.check()?;

        let scenario = Scenario::new(page, &self.config);

        scenario.wait_for_ui().await?;
        reporter.check()?;

        scenario.answer_current_problem().await?;
        reporter.check()?;

        scenario.assert_progress_saved().await?;

        scenario.ensure_next_changes_exercise().await?;
        reporter.check()?;

        scenario.exercise_pin_gate().await?;
        reporter.check()?;

        info!("Scenario completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> Vec<String> {
        vec!["plusminus".to_string(), "PlusMinus".to_string()]
    }

    #[test]
    fn test_locate_module_prefers_first_candidate() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["plusminus", "PlusMinus"] {
            std::fs::create_dir(root.path().join(dir)).unwrap();
            std::fs::write(root.path().join(dir).join("index.html"), "<html></html>").unwrap();
        }
        assert_eq!(locate_module(root.path(), &dirs()).unwrap(), "plusminus");
    }

    #[test]
    fn test_locate_module_falls_back() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("plusminus")).unwrap();
        std::fs::create_dir(root.path().join("PlusMinus")).unwrap();
        std::fs::write(root.path().join("PlusMinus/index.html"), "<html></html>").unwrap();
        assert_eq!(locate_module(root.path(), &dirs()).unwrap(), "PlusMinus");
    }

    #[test]
    fn test_locate_module_missing() {
        let root = tempfile::tempdir().unwrap();
        let err = locate_module(root.path(), &dirs()).unwrap_err();
        assert!(matches!(err, E2eError::Precondition(_)));
        assert!(err.to_string().contains("plusminus/index.html or PlusMinus/index.html"));
    }

    #[test]
    fn test_inline_script_files_include_module_page_once() {
        let runner = SmokeRunner::new("/srv", SmokeConfig::default());
        assert_eq!(
            runner.inline_script_files("plusminus"),
            vec!["index.html".to_string(), "plusminus/index.html".to_string()]
        );

        let mut config = SmokeConfig::default();
        config.inline_script_pages = vec!["plusminus/index.html".to_string()];
        let runner = SmokeRunner::new("/srv", config);
        assert_eq!(
            runner.inline_script_files("plusminus"),
            vec!["plusminus/index.html".to_string()]
        );
    }

    #[tokio::test]
    async fn test_run_reports_missing_module() {
        let root = tempfile::tempdir().unwrap();
        let runner = SmokeRunner::new(root.path(), SmokeConfig::default());
        let result = runner.run().await;
        assert!(!result.is_success());
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].starts_with("Precondition failed"));
    }
}
