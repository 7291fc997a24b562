//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, CORS, client timeout)
//! - Serve the frontend bundle when one is configured
//! - Hand everything else to the relay
//! - Bind server to listener and drain on shutdown
//!
//! # Data Flow
//! ```text
//! Request
//!     → SetRequestId → Trace → PropagateRequestId → CORS → Timeout
//!     → /api/gemini            → GenerativeRelay
//!     → navigation (text/html) → bundle file, else index.html
//!     → anything else          → bundle file, else Relay
//! ```

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::{any, MethodRouter},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::is_navigation;
use crate::lifecycle::shutdown::recv_shutdown;
use crate::relay::{GenerativeRelay, Relay};
use crate::security::cors::cors_layer;

/// Path of the generative text endpoint.
pub const GENERATIVE_PATH: &str = "/api/gemini";

/// Error type for server construction.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Built frontend bundle served next to the relay.
#[derive(Clone)]
pub struct Frontend {
    /// Navigations: existing files, otherwise `index.html`.
    pages: ServeDir<ServeFile>,
    /// Everything else: existing files, otherwise the relay.
    assets: ServeDir<MethodRouter>,
}

impl Frontend {
    pub fn new(dir: &Path, relay: Arc<Relay>) -> Self {
        let pages = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
        let assets = ServeDir::new(dir)
            .append_index_html_on_directories(false)
            .call_fallback_on_method_not_allowed(true)
            .fallback(any(relay_handler).with_state(relay));
        Self { pages, assets }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub generative: Arc<GenerativeRelay>,
    pub frontend: Option<Frontend>,
}

impl AppState {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ServerError> {
        let relay = Arc::new(Relay::from_config(config)?);
        let generative = Arc::new(GenerativeRelay::from_config(config)?);
        let frontend = config
            .relay
            .static_dir
            .as_deref()
            .map(|dir| Frontend::new(dir, relay.clone()));
        Ok(Self {
            relay,
            generative,
            frontend,
        })
    }
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let state = AppState::from_config(&config)?;
        let router = build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.config.relay.backend_url,
            upload_dir = %self.config.relay.upload_dir.display(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(recv_shutdown(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &ProxyConfig, state: AppState) -> Router {
    let mut router = Router::new()
        .route(GENERATIVE_PATH, any(generative_handler))
        .fallback(fallback_handler)
        .with_state(state);

    if let Some(timeout) = config.timeouts.client() {
        router = router.layer(TimeoutLayer::new(timeout));
    }
    if let Some(cors) = cors_layer(&config.listener.cors_origins) {
        router = router.layer(cors);
    }

    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn generative_handler(State(state): State<AppState>, request: Request) -> Response {
    state.generative.handle(request).await
}

async fn relay_handler(State(relay): State<Arc<Relay>>, request: Request) -> Response {
    relay.handle(request).await
}

async fn fallback_handler(State(state): State<AppState>, request: Request) -> Response {
    match &state.frontend {
        Some(frontend) if is_navigation(request.method(), request.headers()) => {
            frontend.pages.clone().oneshot(request).await.into_response()
        }
        Some(frontend) => frontend.assets.clone().oneshot(request).await.into_response(),
        None => state.relay.handle(request).await,
    }
}
