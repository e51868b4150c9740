//! HTTP route handlers for the protocol endpoints.

pub mod info;
pub mod transfer;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the protocol router: the five LocalSend v2 endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/localsend/v2", protocol_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn protocol_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/info", get(info::get_info))
        .route("/register", post(info::register))
        .route("/prepare-upload", post(transfer::prepare_upload))
        .route("/upload", post(transfer::upload))
        .route("/cancel", post(transfer::cancel))
}

/// `{message}` body with the given status, the protocol's error shape.
pub(crate) fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}
