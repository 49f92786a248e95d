//! Static site server for the built web UI.
//!
//! ## Routes
//!
//! - `GET /health`: `{"status": "ok", "version": ...}`
//! - anything else: a file from the dist directory, or the entry document
//!   so client-side routes resolve

use axum::Router;
use axum::response::Json;
use axum::routing::get;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{CoachError, Result};

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Port to bind: `PORT` when it holds a valid port number, the configured
/// port otherwise.
pub fn effective_port(config: &ServerConfig, env_port: Option<&str>) -> u16 {
    match env_port.map(str::trim) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(port = raw, "ignoring invalid PORT");
            config.port
        }),
        None => config.port,
    }
}

/// Router serving `config.dist_dir` with an entry-document fallback.
pub fn router(config: &ServerConfig) -> Router {
    let index = config.dist_dir.join(&config.index_file);
    let files = ServeDir::new(&config.dist_dir).fallback(ServeFile::new(index));
    Router::new()
        .route("/health", get(handle_health))
        .fallback_service(files)
        .layer(TraceLayer::new_for_http())
}

/// Running static site server.
pub struct StaticSiteServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StaticSiteServer {
    /// Bind `{host}:{port}` (port `0` picks a free port) and serve in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Server`] if the listener cannot bind.
    pub async fn start(config: &ServerConfig) -> Result<Self> {
        if !config.dist_dir.is_dir() {
            warn!(dist = %config.dist_dir.display(), "dist directory does not exist");
        }
        let app = router(config);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| CoachError::Server(format!("bind to {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| CoachError::Server(format!("failed to get local addr: {e}")))?;

        info!(dist = %config.dist_dir.display(), "static site listening on http://{addr}");

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("static site server error: {e}");
            }
        });

        Ok(Self {
            addr,
            cancel,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("static site server task failed: {e}");
        }
    }
}
