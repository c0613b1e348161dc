//! Gateway HTTP Server
//!
//! Axum-based server assembling the webhook and billing routers with
//! CORS, request tracing and graceful shutdown.

use crate::auth::UserAuth;
use crate::billing::{billing_router, CheckoutClient};
use crate::clones::CloneResponder;
use crate::config::Config;
use crate::dispatch::MessageDispatcher;
use crate::quota::QuotaEnforcer;
use crate::store::RecordStore;
use crate::webhook::webhook_router;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<RecordStore>,
    pub quota: QuotaEnforcer,
    pub dispatcher: Arc<dyn MessageDispatcher>,
    pub responder: Arc<dyn CloneResponder>,
    pub auth: Option<Arc<dyn UserAuth>>,
    pub checkout: Option<Arc<dyn CheckoutClient>>,
    /// Server start time for uptime reporting
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<RecordStore>,
        dispatcher: Arc<dyn MessageDispatcher>,
        responder: Arc<dyn CloneResponder>,
    ) -> Self {
        Self {
            config,
            quota: QuotaEnforcer::new(store.clone()),
            store,
            dispatcher,
            responder,
            auth: None,
            checkout: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn UserAuth>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_checkout(mut self, checkout: Arc<dyn CheckoutClient>) -> Self {
        self.checkout = Some(checkout);
        self
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub timestamp: String,
}

/// Health check handler for load balancers and monitoring
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Liveness probe (minimal response)
async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Gateway server
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

        Router::new()
            .route("/health", get(health_check))
            .route("/healthz", get(liveness))
            .with_state(self.state.clone())
            .merge(webhook_router(self.state.clone()))
            .merge(billing_router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.state.config.bind_addr;
        let router = self.build_router();

        info!("Starting Genia gateway on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Gateway shut down gracefully");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clones::StubResponder;
    use crate::dispatch::MockDispatcher;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_server() -> GatewayServer {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let state = AppState::new(
            Config::for_tests(),
            store,
            Arc::new(MockDispatcher::new("+14155238886")),
            Arc::new(StubResponder),
        );
        GatewayServer::new(Arc::new(state))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_server().build_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn test_liveness_endpoint() {
        let app = test_server().build_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
