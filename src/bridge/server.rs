#![allow(clippy::result_large_err)] // Server helpers return AppError for consistent diagnostics.

use super::protocol::{ExecutionRequest, HealthResponse, StateResponse};
use crate::core::config::{BridgeConfig, ConfigValidator};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::executor::{ExecutionResult, LocalExecutor};
use crate::utils::shutdown_signal;
use axum::{
    body::{Body, Bytes},
    extract::{Extension, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::util::MapResponseLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

/// State shared across bridge requests.
struct BridgeState {
    executor: LocalExecutor,
    auth_token: String,
}

/// Start the bridge listener and block until SIGINT/SIGTERM.
pub async fn serve_bridge(config: &BridgeConfig, executor: LocalExecutor) -> Result<(), AppError> {
    serve_bridge_internal(config, executor, None, shutdown_signal()).await
}

/// Start the bridge listener and notify once the bind address is known (test helper).
pub async fn serve_bridge_with_ready_notifier(
    config: &BridgeConfig,
    executor: LocalExecutor,
    ready_notifier: oneshot::Sender<SocketAddr>,
) -> Result<(), AppError> {
    serve_bridge_internal(config, executor, Some(ready_notifier), shutdown_signal()).await
}

async fn serve_bridge_internal(
    config: &BridgeConfig,
    executor: LocalExecutor,
    ready_notifier: Option<oneshot::Sender<SocketAddr>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    // Refuses to listen without a shared secret.
    let bind_addr = ConfigValidator::validate_server(config)?;
    let state = Arc::new(BridgeState {
        executor,
        auth_token: config.bridge.token.trim().to_string(),
    });

    let router = build_router(state, config.bridge.max_body_bytes);
    let listener = TcpListener::bind(bind_addr).await.map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to bind bridge listener {}: {}", bind_addr, err),
        )
        .with_code("RB-BRIDGE-001")
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to determine bridge listener address: {}", err),
        )
    })?;
    if let Some(tx) = ready_notifier {
        let _ = tx.send(local_addr);
    }
    info!("bridge server listening on {}", local_addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("bridge server terminated: {}", err),
            )
            .with_code("RB-BRIDGE-002")
        })?;
    info!("bridge server stopped");
    Ok(())
}

fn build_router(state: Arc<BridgeState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/execute", post(handle_execute).fallback(handle_not_found))
        .route("/state", post(handle_state).fallback(handle_not_found))
        .route("/health", get(handle_health).fallback(handle_not_found))
        .fallback(handle_not_found)
        .layer(Extension(state.clone()))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        // Outside the body limit: a bad token is rejected before the body is looked at.
        .layer(middleware::from_fn_with_state(state, require_bearer))
        .layer(MapResponseLayer::new(|mut response: Response<Body>| {
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                let body = json!({ "error": "Payload too large" }).to_string();
                *response.body_mut() = Body::from(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            response
        }))
}

async fn require_bearer(
    State(state): State<Arc<BridgeState>>,
    request: Request,
    next: Next,
) -> Response<Body> {
    let protected = request.method() == Method::POST
        && matches!(request.uri().path(), "/execute" | "/state");
    if protected && !is_authorized(request.headers(), &state.auth_token) {
        return BridgeRejection::unauthorized().into_response();
    }
    next.run(request).await
}

async fn handle_execute(
    Extension(state): Extension<Arc<BridgeState>>,
    body: Bytes,
) -> Result<Json<ExecutionResult>, BridgeRejection> {
    let request: ExecutionRequest = serde_json::from_slice(&body)
        .map_err(|err| BridgeRejection::bad_request(format!("invalid JSON body: {}", err)))?;

    info!(
        description = request.description.as_deref().unwrap_or(""),
        code_bytes = request.code.len(),
        "bridge execute request"
    );
    let result = state.executor.execute(&request.code).await;
    Ok(Json(result))
}

async fn handle_state(Extension(state): Extension<Arc<BridgeState>>) -> Json<StateResponse> {
    info!("bridge state request");
    let snapshot = state.executor.snapshot().await;
    Json(StateResponse { state: snapshot })
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn handle_not_found() -> BridgeRejection {
    BridgeRejection::not_found()
}

fn is_authorized(headers: &HeaderMap, expected: &str) -> bool {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if let Some(token) = header_value {
        token.as_bytes().ct_eq(expected.as_bytes()).into()
    } else {
        false
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else {
        "internal server error".to_string()
    };
    tracing::error!(panic = %message, "bridge handler panicked");
    BridgeRejection::internal(message).into_response()
}

struct BridgeRejection {
    status: StatusCode,
    message: String,
}

impl BridgeRejection {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Unauthorized".to_string(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Not found".to_string(),
        }
    }

    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl IntoResponse for BridgeRejection {
    fn into_response(self) -> Response<Body> {
        let mut resp = Json(json!({ "error": self.message })).into_response();
        *resp.status_mut() = self.status;
        resp
    }
}
