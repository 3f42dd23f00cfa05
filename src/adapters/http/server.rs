//! HTTP server built on axum. Implements the inbound ApiPort.
//!
//! Routes, middleware and shared state wiring; no business logic here.

use crate::adapters::http::auth::{auth_middleware, AuthState};
use crate::adapters::http::handlers::{self, AppState};
use crate::adapters::http::sse;
use crate::domain::DomainError;
use crate::ports::ApiPort;
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// The HTTP adapter. Owns the handler state and serves the REST surface.
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    fn router(&self) -> Router {
        let auth_state = AuthState {
            ledger: self.state.ledger.clone(),
        };

        // Unauthenticated liveness probe.
        let public_routes = Router::new().route("/health", get(handlers::get_health));

        // Everything under /api requires a valid X-Api-Key.
        let api_routes = Router::new()
            .route(
                "/api/validation/quick-check",
                post(handlers::post_quick_check),
            )
            .route("/api/validation/bulk-check", post(handlers::post_bulk_check))
            .route(
                "/api/jobs/{id}",
                get(handlers::get_job).delete(handlers::delete_job),
            )
            .route("/api/jobs/{id}/status", get(handlers::get_job_status))
            .route("/api/jobs/{id}/download", get(handlers::download_job))
            .route("/api/jobs/{id}/cancel", post(handlers::cancel_job))
            .route("/api/jobs/{id}/events", get(sse::job_events))
            .route_layer(axum_middleware::from_fn_with_state(
                auth_state,
                auth_middleware,
            ))
            .with_state(self.state.clone());

        Router::new()
            .merge(public_routes)
            .merge(api_routes)
            .layer(DefaultBodyLimit::max(
                // multipart framing overhead on top of the file limit
                self.state.limits.max_upload_bytes + 64 * 1024,
            ))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait::async_trait]
impl ApiPort for HttpServer {
    async fn serve(&self) -> Result<(), DomainError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| DomainError::Store(format!("failed to bind {addr}: {e}")))?;

        info!(addr = %addr, "HTTP server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| DomainError::Store(format!("server error: {e}")))
    }
}
