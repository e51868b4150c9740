//! Discovery endpoints: descriptor exchange.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lanbeam_core::DeviceInfo;
use tracing::debug;

use crate::routes::message_response;
use crate::state::AppState;

/// GET /api/localsend/v2/info
pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<DeviceInfo> {
    Json(state.config.device.clone())
}

/// POST /api/localsend/v2/register. Records the peer and answers with
/// our own descriptor.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<DeviceInfo>, JsonRejection>,
) -> Response {
    let Json(peer) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return message_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    if peer.fingerprint == state.config.device.fingerprint {
        debug!("ignoring register from ourselves");
    } else {
        debug!(fingerprint = %peer.fingerprint, ip = %addr.ip(), "peer registered");
        state.registry.insert(peer.with_ip(addr.ip().to_string()));
    }

    Json(state.config.device.clone()).into_response()
}
