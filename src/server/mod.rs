//! Development server with live reload.
//!
//! Serves the environment's output root (static projects) or proxies an
//! upstream site (WordPress projects) on `127.0.0.1:<port>`. HTML responses
//! carry a script that reloads the page when [`Reloader`] is signalled.
//!
//! The server runs on its own tokio runtime so the blocking watch loop can
//! keep the calling thread.

pub mod proxy;
pub mod reload;

pub use reload::{Reloader, RELOAD_PATH};

use crate::build::TaskContext;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use proxy::Upstream;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Error starting or running the dev server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The tokio runtime could not be created
    #[error("Failed to start server runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// The listen address is taken or not allowed
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The proxy upstream is not a usable URL
    #[error("Invalid proxy upstream '{0}': {1}")]
    Upstream(String, String),
    /// Talking to the upstream failed
    #[error("Upstream request failed: {0}")]
    Client(#[source] reqwest::Error),
    /// A request body could not be read
    #[error("Failed to read request body: {0}")]
    Body(String),
}

/// What the server answers requests with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Files under a directory
    Static(PathBuf),
    /// Another HTTP origin
    Proxy(String),
}

/// Dev server settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Port on 127.0.0.1; 0 picks a free one
    pub port: u16,
    /// Allow any origin
    pub cors: bool,
    /// Request handling
    pub backend: Backend,
}

impl ServerOptions {
    /// Settings from the project configuration and selected environment.
    pub fn from_context(ctx: &TaskContext) -> Self {
        let server = &ctx.config().server;
        let backend = match &server.proxy {
            Some(url) => Backend::Proxy(url.clone()),
            None => Backend::Static(ctx.out_root()),
        };
        Self { port: server.port, cors: server.cors, backend }
    }
}

fn build_router(options: &ServerOptions, reloader: Reloader) -> Result<Router, ServerError> {
    let router = Router::new().route(RELOAD_PATH, get(reload::poll));
    let router = match &options.backend {
        Backend::Static(root) => {
            router.fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
        }
        Backend::Proxy(url) => {
            router.fallback_service(any(proxy::forward).with_state(Upstream::new(url)?))
        }
    };

    let mut router = router.with_state(reloader).layer(middleware::from_fn(inject_reload_script));
    if options.cors {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
        router = router.layer(cors);
    }
    Ok(router.layer(TraceLayer::new_for_http()))
}

/// Add the reload script to successful HTML responses.
async fn inject_reload_script(request: Request, next: Next) -> Response {
    let is_head = request.method() == Method::HEAD;
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/html"))
        .unwrap_or(false);
    if is_head || response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to buffer HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let body = match std::str::from_utf8(&bytes) {
        Ok(html) => Body::from(reload::inject_script(html)),
        Err(_) => Body::from(bytes),
    };
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, body)
}

/// A running dev server. Dropping it stops the server.
pub struct ServerHandle {
    runtime: tokio::runtime::Runtime,
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
    reloader: Reloader,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Reload signal shared with connected pages.
    pub fn reloader(&self) -> &Reloader {
        &self.reloader
    }

    /// Stop accepting connections and wait briefly for open ones.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let ServerHandle { runtime, .. } = self;
        runtime.shutdown_timeout(Duration::from_secs(1));
    }
}

/// Start the server configured by a task context.
pub fn start(ctx: &TaskContext) -> Result<ServerHandle, ServerError> {
    start_with(ServerOptions::from_context(ctx))
}

/// Start a server with explicit options.
pub fn start_with(options: ServerOptions) -> Result<ServerHandle, ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("aflow-server")
        .build()
        .map_err(ServerError::Runtime)?;

    let reloader = Reloader::new();
    let app = build_router(&options, reloader.clone())?;

    let addr = SocketAddr::from(([127, 0, 0, 1], options.port));
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind(addr))
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(|source| ServerError::Bind { addr, source })?;

    match &options.backend {
        Backend::Static(root) => info!("serving {} at http://{}", root.display(), addr),
        Backend::Proxy(url) => info!("proxying {} at http://{}", url, addr),
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    runtime.spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("dev server shutting down");
            })
            .await
        {
            error!("dev server error: {}", e);
        }
    });

    Ok(ServerHandle { runtime, shutdown_tx: Some(shutdown_tx), addr, reloader })
}
