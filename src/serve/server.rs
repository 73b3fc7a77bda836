//! Axum catalog server and its cancellable background lifecycle.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path as RoutePath, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ServerSettings;
use crate::serve::catalog::{
    render_index, scan_catalog, RouteCache, ARCHIVE_CONTENT_TYPE, THUMBNAIL_CONTENT_TYPE,
    THUMBNAIL_SUFFIX,
};
use crate::serve::error::ServeError;

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory scanned for archives; the process working directory when
    /// unset.
    pub directory: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 19900,
            directory: None,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            directory: settings.directory.clone(),
        }
    }
}

/// Shared state behind the router. The mutex covers the scan plus the
/// conditional route registration it triggers; content and thumbnail reads
/// only clone a captured path out of it.
#[derive(Clone)]
struct CatalogState {
    directory: Option<PathBuf>,
    routes: Arc<Mutex<RouteCache>>,
}

impl CatalogState {
    fn resolve_dir(&self) -> Result<PathBuf, ServeError> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|source| ServeError::Scan {
                path: PathBuf::from("."),
                source,
            }),
        }
    }
}

/// `GET /` — scan the directory, lazily register routes, render the index.
async fn index(State(state): State<CatalogState>) -> Result<Html<String>, ServeError> {
    let dir = state.resolve_dir()?;
    let entries = {
        let mut cache = state.routes.lock();
        scan_catalog(&dir, &mut cache)?
    };
    Ok(Html(render_index(&entries)))
}

/// `GET /usdz/{name}` — archive bytes, or thumbnail bytes for the
/// `-thumb.png` suffix. Reads the backing file at request time.
async fn asset(
    State(state): State<CatalogState>,
    RoutePath(name): RoutePath<String>,
) -> Result<Response, ServeError> {
    let (path, content_type) = {
        let cache = state.routes.lock();
        if let Some(asset) = cache.get(&name) {
            (asset.archive_path.clone(), ARCHIVE_CONTENT_TYPE)
        } else if let Some(asset) = name
            .strip_suffix(THUMBNAIL_SUFFIX)
            .and_then(|base| cache.get(base))
        {
            (asset.thumbnail_path.clone(), THUMBNAIL_CONTENT_TYPE)
        } else {
            return Err(ServeError::NotFound(name));
        }
    };

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| ServeError::Read { path, source })?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Build the catalog router over `directory`, with a fresh route cache.
pub fn catalog_router(directory: Option<PathBuf>) -> Router {
    let state = CatalogState {
        directory,
        routes: Arc::new(Mutex::new(RouteCache::default())),
    };
    Router::new()
        .route("/", get(index))
        .route("/usdz/{name}", get(asset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Completion report posted by the background listener task.
struct ServerExit {
    generation: u64,
    fault: Option<anyhow::Error>,
}

/// Cancellation signal and task reference for the live listener.
struct ServerHandle {
    addr: SocketAddr,
    cancel: CancellationToken,
    generation: u64,
    _task: JoinHandle<()>,
}

/// Owns at most one background listener serving the asset catalog.
///
/// Completion reports are marshalled back through an internal channel and
/// checked against the live handle's generation, so a report from a
/// superseded listener is discarded as stale rather than tearing down its
/// replacement.
pub struct CatalogServer {
    config: ServerConfig,
    live: Option<ServerHandle>,
    generation: u64,
    exit_tx: mpsc::UnboundedSender<ServerExit>,
    exit_rx: mpsc::UnboundedReceiver<ServerExit>,
}

impl CatalogServer {
    pub fn new(config: ServerConfig) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            config,
            live: None,
            generation: 0,
            exit_tx,
            exit_rx,
        }
    }

    pub fn is_serving(&self) -> bool {
        self.live.is_some()
    }

    /// Address of the live listener, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.live.as_ref().map(|h| h.addr)
    }

    /// Launch the background listener. A no-op returning the existing
    /// address when already serving.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if let Some(live) = &self.live {
            return Ok(live.addr);
        }

        let app = catalog_router(self.config.directory.clone());
        let bind_addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        let addr = listener.local_addr()?;

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone().cancelled_owned();
        let exit_tx = self.exit_tx.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await;
            // Clean cancellation resolves to Ok and is never a fault.
            let fault = result.err().map(anyhow::Error::from);
            let _ = exit_tx.send(ServerExit { generation, fault });
        });

        tracing::info!(%addr, "catalog server listening");
        self.live = Some(ServerHandle {
            addr,
            cancel,
            generation,
            _task: task,
        });
        Ok(addr)
    }

    /// Signal cancellation and drop the live handle. A no-op when not
    /// serving. In-flight requests finish; no new ones are accepted.
    pub fn stop(&mut self) {
        let Some(handle) = self.live.take() else {
            return;
        };
        handle.cancel.cancel();
        tracing::info!(generation = handle.generation, "catalog server stopping");
    }

    /// Drain completion reports without blocking. Returns true when the live
    /// listener was torn down by a report.
    pub fn poll_exit(&mut self) -> bool {
        let mut torn_down = false;
        while let Ok(exit) = self.exit_rx.try_recv() {
            torn_down |= self.handle_exit(exit);
        }
        torn_down
    }

    /// Wait until the live listener exits on its own (fault or external
    /// cancellation of its token). Stale reports from superseded listeners
    /// are discarded along the way.
    pub async fn wait_for_exit(&mut self) {
        while let Some(exit) = self.exit_rx.recv().await {
            if self.handle_exit(exit) {
                return;
            }
        }
    }

    fn handle_exit(&mut self, exit: ServerExit) -> bool {
        let is_live = self
            .live
            .as_ref()
            .is_some_and(|live| live.generation == exit.generation);
        if !is_live {
            // Superseded or already stopped: discard as stale.
            tracing::debug!(generation = exit.generation, "discarding stale server exit");
            return false;
        }
        if let Some(fault) = exit.fault {
            tracing::error!(error = %fault, "catalog server failed");
        }
        self.live = None;
        true
    }
}

impl Drop for CatalogServer {
    fn drop(&mut self) {
        self.stop();
    }
}
