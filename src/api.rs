//! HTTP surface of the configuration service.
//!
//! | Method | Path          | Description                                   |
//! |--------|---------------|-----------------------------------------------|
//! | GET    | `/health`     | Liveness probe                                |
//! | GET    | `/config`     | Current document (created empty if absent)    |
//! | PUT    | `/config`     | Validate + atomically replace the document    |
//! | GET    | `/port-check` | Is a local port already in use?               |
//!
//! Every route is restricted to loopback callers; rejections use the same
//! `{"detail": ...}` body shape as validation errors.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::probe::{Prober, TcpProber};
use crate::store::{DocumentStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config).put(put_config))
        .route("/port-check", get(port_check))
        .layer(middleware::from_fn(require_local))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Rejects any client that is not connecting from a loopback address. The
/// document controls what gets forwarded where, so only the local operator
/// may read or edit it.
pub async fn require_local(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !client_is_local(&addr) {
        return ApiError::forbidden("Local access only.").into_response();
    }
    next.run(request).await
}

pub fn client_is_local(addr: &SocketAddr) -> bool {
    // to_canonical folds IPv4-mapped IPv6 (::ffff:127.0.0.1) into IPv4.
    addr.ip().to_canonical().is_loopback()
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn get_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let document = state.store.load_or_init()?;
    Ok(Json(document))
}

async fn put_config(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.store.replace(&payload)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
struct PortCheckQuery {
    port: i64,
}

async fn port_check(Query(query): Query<PortCheckQuery>) -> Result<Json<Value>, ApiError> {
    if !(1..=65535).contains(&query.port) {
        return Err(ApiError::bad_request("port out of range 1-65535"));
    }
    let port = query.port as u16;

    // The probe blocks for up to its timeout; keep it off the runtime threads.
    let in_use = tokio::task::spawn_blocking(move || TcpProber::default().port_is_up(port))
        .await
        .map_err(|e| ApiError::internal(format!("port check failed: {e}")))?;

    Ok(Json(json!({ "port": port, "in_use": in_use })))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn forbidden(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(detail) => Self::bad_request(detail),
            StoreError::Io(detail) => Self::internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_clients_are_local() {
        assert!(client_is_local(&"127.0.0.1:9999".parse().unwrap()));
        assert!(client_is_local(&"[::1]:9999".parse().unwrap()));
        assert!(client_is_local(&"[::ffff:127.0.0.1]:9999".parse().unwrap()));
    }

    #[test]
    fn remote_clients_are_not() {
        assert!(!client_is_local(&"10.0.0.9:9999".parse().unwrap()));
        assert!(!client_is_local(&"[2001:db8::1]:9999".parse().unwrap()));
    }

    #[test]
    fn store_errors_map_to_status_codes() {
        let rejected: ApiError = StoreError::Rejected("duplicate local_port 5432".into()).into();
        assert_eq!(rejected.status, StatusCode::BAD_REQUEST);

        let io: ApiError = StoreError::Io("disk full".into()).into();
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
