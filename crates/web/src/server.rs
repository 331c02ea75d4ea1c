//! Loopback HTTP server over [`StaticFiles`]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{extract::State, http::Uri, response::Response, routing::get, Router};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::static_files::StaticFiles;

/// Static file server for a repository root
#[derive(Clone)]
pub struct StaticServer {
    files: Arc<StaticFiles>,
}

impl StaticServer {
    /// Create a server for `root`
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            files: Arc::new(StaticFiles::new(root)?),
        })
    }

    /// Canonical directory being served
    pub fn root(&self) -> &Path {
        self.files.root()
    }

    /// Build the router. Every GET path goes through the file handler.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(static_handler))
            .route("/*path", get(static_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.files.clone())
    }

    /// Bind `addr` and serve in a background task.
    ///
    /// Pass port 0 to let the OS pick a free port; the returned handle
    /// reports the address actually bound.
    pub async fn bind(self, addr: SocketAddr) -> std::io::Result<ServerHandle> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(
            "Serving {} on http://{}",
            self.files.root().display(),
            local_addr
        );

        Ok(ServerHandle {
            addr: local_addr,
            base_url: format!("http://{}", local_addr),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Bind an ephemeral loopback port
    pub async fn bind_loopback(self) -> std::io::Result<ServerHandle> {
        self.bind(SocketAddr::from(([127, 0, 0, 1], 0))).await
    }
}

async fn static_handler(State(files): State<Arc<StaticFiles>>, uri: Uri) -> Response {
    files.serve(uri.path()).await
}

/// Handle to a running server task.
///
/// Dropping the handle stops the server.
pub struct ServerHandle {
    addr: SocketAddr,
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop accepting connections and wait for the serving task to finish
    pub async fn shutdown(mut self) -> std::io::Result<()> {
        info!("Stopping server on {}", self.addr);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
            },
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            debug!("Server handle dropped, stopping {}", self.addr);
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                warn!("Aborting server task on {}", self.addr);
                task.abort();
            }
        }
    }
}
