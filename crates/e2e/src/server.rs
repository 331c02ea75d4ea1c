//! Server management - serving the page root in-process and probing readiness

use std::path::Path;
use std::time::{Duration, Instant};

use plusminus_web::{ServerHandle, StaticServer};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Static server for the page under test, on an ephemeral loopback port
pub struct PageServer {
    handle: ServerHandle,
}

impl PageServer {
    /// Serve `root` and wait until it answers
    pub async fn start(root: &Path, ready_timeout: Duration) -> E2eResult<Self> {
        let server = StaticServer::new(root).map_err(|e| {
            E2eError::ServerStartup(format!("Cannot serve {}: {}", root.display(), e))
        })?;
        let handle = server
            .bind_loopback()
            .await
            .map_err(|e| E2eError::ServerStartup(format!("Failed to bind: {}", e)))?;

        let server = PageServer { handle };
        server.wait_for_ready(ready_timeout).await?;

        info!("Server is ready at {}", server.base_url());
        Ok(server)
    }

    /// Poll `GET /` until the server answers with a success or a 404.
    ///
    /// A root without an index page still proves the server is up.
    async fn wait_for_ready(&self, timeout_duration: Duration) -> E2eResult<()> {
        let url = format!("{}/", self.base_url());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&url).send().await {
                Ok(resp)
                    if resp.status().is_success()
                        || resp.status() == reqwest::StatusCode::NOT_FOUND =>
                {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Readiness probe returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    if !e.is_connect() {
                        warn!("Readiness probe error: {}", e);
                    }
                }
            }

            sleep(PROBE_INTERVAL).await;
        }

        Err(E2eError::ServerNotReady(attempts))
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`
    pub fn base_url(&self) -> &str {
        self.handle.base_url()
    }

    /// URL of a page directory below the root
    pub fn page_url(&self, dir: &str) -> String {
        format!("{}/{}/", self.base_url(), dir.trim_matches('/'))
    }

    /// Stop the server
    pub async fn stop(self) -> E2eResult<()> {
        self.handle.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_without_index_page() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("plusminus")).unwrap();

        let server = PageServer::start(dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert_eq!(
            server.page_url("/plusminus/"),
            format!("{}/plusminus/", server.base_url())
        );
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_root_is_startup_failure() {
        let err = PageServer::start(Path::new("/nonexistent/plusminus-root"), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, E2eError::ServerStartup(_)));
    }
}
