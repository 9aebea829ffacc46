pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod listener;
pub mod relay;
pub mod writer;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use error::AppError;
use oracle_ledger::Ledger;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Max request body size: 1 MiB
const MAX_BODY_BYTES: usize = 1_048_576;
/// Request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/tip", get(api::tip))
        .route("/v1/requests", post(api::create_request))
        .route("/v1/requests/:id", get(api::get_request))
        .route("/v1/requests/:id/response", get(api::get_response))
        .route("/v1/requests/:id/fulfill", post(api::fulfill_request))
        .route("/v1/read-only-mode/start", post(api::start_read_only_mode))
        .route("/v1/read-only-mode/exit", post(api::exit_read_only_mode))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(require_json_content_type))
        .with_state(state)
}

/// Middleware: reject POST requests without application/json content-type.
async fn require_json_content_type(req: Request, next: Next) -> Response {
    let is_json = match req.method().as_str() {
        "POST" | "PUT" | "PATCH" => req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false),
        _ => true,
    };
    if !is_json {
        return AppError::unsupported_media_type().into_response();
    }
    next.run(req).await
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

pub mod test {
    use crate::config::RelayConfig;
    use crate::context::RelayContext;
    use crate::AppState;
    use oracle_ledger::Ledger;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Spawn the node API on a random port over a fresh in-memory ledger.
    pub async fn spawn() -> (SocketAddr, Arc<Ledger>, JoinHandle<()>) {
        spawn_with(Arc::new(Ledger::in_memory())).await
    }

    pub async fn spawn_with(ledger: Arc<Ledger>) -> (SocketAddr, Arc<Ledger>, JoinHandle<()>) {
        let app = super::app(AppState::new(ledger.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, ledger, handle)
    }

    /// A node API plus a running relay; both stop when this is dropped.
    pub struct TestNode {
        pub addr: SocketAddr,
        pub ledger: Arc<Ledger>,
        server: JoinHandle<()>,
        relay: JoinHandle<()>,
    }

    impl TestNode {
        pub fn base(&self) -> String {
            format!("http://{}", self.addr)
        }
    }

    impl Drop for TestNode {
        fn drop(&mut self) {
            self.server.abort();
            self.relay.abort();
        }
    }

    /// Spawn the API and a relay (configured by `config`) over `ledger`.
    pub async fn spawn_node(ledger: Arc<Ledger>, config: RelayConfig) -> TestNode {
        let (addr, ledger, server) = spawn_with(ledger).await;
        let ctx = Arc::new(RelayContext::new(ledger.clone(), &config).unwrap());
        let relay = tokio::spawn(async move {
            let _ = crate::relay::run(ctx).await;
        });
        TestNode {
            addr,
            ledger,
            server,
            relay,
        }
    }
}
