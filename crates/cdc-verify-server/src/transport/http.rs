//! HTTP transport: the action endpoint, /health, and CORS.

use std::any::Any;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method, StatusCode,
    },
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};

use cdc_verify::VerificationFlow;

use crate::actions::ActionRegistry;
use crate::types::{ServerError, ServerResult};

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub flow: VerificationFlow,
}

/// HTTP server wrapping one [`VerificationFlow`].
pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    pub fn new(flow: VerificationFlow) -> Self {
        Self {
            state: Arc::new(ServerState { flow }),
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> ServerResult<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("HTTP transport listening on {addr}");

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

/// Build the application router.
pub fn router(state: Arc<ServerState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            CONTENT_TYPE,
        ]);

    Router::new()
        .route("/api/cdc", post(handle_action))
        .route("/health", get(handle_health))
        .layer(cors_layer)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

fn error_response(err: &ServerError) -> Response {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, AxumJson(err.to_body())).into_response()
}

/// Handle `{ "action": <name>, ...args }`.
async fn handle_action(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return error_response(&ServerError::Json(e)),
    };

    let Some(action) = request.get("action").and_then(Value::as_str) else {
        return error_response(&ServerError::InvalidParams(
            "Missing required field: action".to_string(),
        ));
    };

    tracing::info!("Action {action}");
    match ActionRegistry::call(action, request.clone(), &state.flow).await {
        Ok(value) => (StatusCode::OK, AxumJson(value)).into_response(),
        Err(e) => {
            tracing::warn!("Action {action} failed ({}): {e}", e.error_type());
            error_response(&e)
        }
    }
}

/// Report a handler panic with the usual failure envelope.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("Handler panicked: {detail}");

    let body = serde_json::json!({
        "success": false,
        "error": "Internal server error",
        "errorType": "internal_error",
        "retryable": false,
    });
    (StatusCode::INTERNAL_SERVER_ERROR, AxumJson(body)).into_response()
}

/// Health check endpoint. Expired sessions are swept before counting.
async fn handle_health(State(state): State<Arc<ServerState>>) -> AxumJson<Value> {
    let sessions = state.flow.sessions();
    let swept = sessions.sweep_expired().await;
    if swept > 0 {
        tracing::debug!("Health check swept {swept} expired session(s)");
    }
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "activeSessions": sessions.len().await,
    }))
}
