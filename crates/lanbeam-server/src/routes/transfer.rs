//! Transfer endpoints: prepare-upload negotiation, the chunked upload
//! pipeline, and cancellation.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use lanbeam_protocol::{
    resolve_destination, ContentRange, FileInfo, PrepareUploadRequest, SessionQuery, UploadQuery,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::events::{CompletionInfo, ProgressEvent};
use crate::routes::message_response;
use crate::session::SessionError;
use crate::state::AppState;

/// Progress callbacks fire at most this often while a chunk streams.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
pub struct PrepareQuery {
    pub pin: Option<String>,
}

fn session_error_response(err: SessionError) -> Response {
    let status = match err {
        SessionError::Blocked => StatusCode::CONFLICT,
        SessionError::SessionNotFound | SessionError::FileNotFound => StatusCode::NOT_FOUND,
        SessionError::BadToken | SessionError::IpMismatch => StatusCode::FORBIDDEN,
    };
    message_response(status, &err.to_string())
}

/// POST /api/localsend/v2/prepare-upload
pub async fn prepare_upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<PrepareQuery>,
    body: Result<Json<PrepareUploadRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return message_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    // A configured PIN replaces interactive confirmation entirely.
    if let Some(required) = &state.config.pin {
        if query.pin.as_deref() != Some(required.as_str()) {
            return message_response(StatusCode::UNAUTHORIZED, "PIN required");
        }
    } else if !state.observer.request_allowed(&request.info, &request.files) {
        return message_response(StatusCode::FORBIDDEN, "Rejected by user");
    }

    if request.files.is_empty() {
        // Accepted, nothing to upload.
        return StatusCode::NO_CONTENT.into_response();
    }

    let sender = request.info.with_ip(addr.ip().to_string());
    match state
        .sessions
        .create_session(sender, addr.ip(), request.files)
    {
        Ok(response) => Json(response).into_response(),
        Err(err @ SessionError::Blocked) => session_error_response(err),
        Err(err) => {
            warn!(error = %err, "prepare-upload failed");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// POST /api/localsend/v2/upload. One chunk (or a whole single-shot
/// body) of a negotiated file.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(_) => {
            return message_response(
                StatusCode::BAD_REQUEST,
                "sessionId, fileId and token are required",
            );
        }
    };

    let file = match state.sessions.authorize_chunk(
        &query.session_id,
        &query.file_id,
        &query.token,
        addr.ip(),
    ) {
        Ok(file) => file,
        Err(err) => return session_error_response(err),
    };

    let range = match headers.get("x-content-range") {
        Some(value) => match value.to_str().ok().map(ContentRange::parse) {
            Some(Ok(range)) => Some(range),
            _ => return message_response(StatusCode::BAD_REQUEST, "malformed X-Content-Range"),
        },
        None => None,
    };
    if let Some(range) = &range {
        if range.total != file.size {
            return message_response(
                StatusCode::BAD_REQUEST,
                "X-Content-Range total does not match the file size",
            );
        }
    }

    if let Some(length) = content_length(&headers) {
        if length > state.config.upload_body_limit {
            return message_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body exceeds the upload size limit",
            );
        }
    }

    let dest = match resolve_destination(&state.config.save_dir, &file.file_name) {
        Ok(dest) => dest,
        Err(err) => return message_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let Some((writer, bytes_received, started_at)) =
        state.sessions.take_progress(&query.session_id, &query.file_id)
    else {
        return session_error_response(SessionError::SessionNotFound);
    };

    // Chunks arrive in strictly increasing offset order.
    let start = range.map(|r| r.start).unwrap_or(0);
    if start != bytes_received {
        state
            .sessions
            .store_progress(&query.session_id, &query.file_id, writer, bytes_received);
        return message_response(StatusCode::BAD_REQUEST, "chunk out of order");
    }

    let mut writer = match open_writer(writer, &state.config.save_dir, &dest, start).await {
        Ok(writer) => writer,
        Err(err) => {
            warn!(error = %err, path = %dest.display(), "failed to open destination");
            state.sessions.abandon_file(&query.session_id, &query.file_id);
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to open file");
        }
    };

    // Stream the body to disk. The in-memory buffer is bounded to one
    // stream frame; a slow disk backpressures the TCP socket naturally.
    let mut stream = body.into_data_stream();
    let mut written = 0u64;
    let mut last_report = Instant::now();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(error = %err, file = %file.file_name, "upload stream aborted");
                state.sessions.abandon_file(&query.session_id, &query.file_id);
                return message_response(StatusCode::INTERNAL_SERVER_ERROR, "upload interrupted");
            }
        };

        // The body limit binds regardless of what the sender declared,
        // covering chunked bodies that carry no Content-Length.
        if written + chunk.len() as u64 > state.config.upload_body_limit {
            state.sessions.abandon_file(&query.session_id, &query.file_id);
            return message_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body exceeds the upload size limit",
            );
        }

        // The descriptor's size is the trusted upload length.
        if bytes_received + written + chunk.len() as u64 > file.size {
            state.sessions.abandon_file(&query.session_id, &query.file_id);
            return message_response(
                StatusCode::BAD_REQUEST,
                "payload exceeds the declared file size",
            );
        }

        if let Err(err) = writer.write_all(&chunk).await {
            warn!(error = %err, file = %file.file_name, "write failed");
            state.sessions.abandon_file(&query.session_id, &query.file_id);
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "write failed");
        }
        written += chunk.len() as u64;

        if last_report.elapsed() >= PROGRESS_INTERVAL {
            last_report = Instant::now();
            state.observer.progress(progress_event(
                &file,
                bytes_received + written,
                started_at,
                None,
            ));
        }
    }

    if let Err(err) = writer.flush().await {
        warn!(error = %err, file = %file.file_name, "flush failed");
        state.sessions.abandon_file(&query.session_id, &query.file_id);
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "write failed");
    }

    let total_received = bytes_received + written;
    let terminal = match &range {
        Some(range) => range.is_terminal(),
        None => total_received >= file.size,
    };

    if !terminal {
        let stored = state.sessions.store_progress(
            &query.session_id,
            &query.file_id,
            Some(writer),
            total_received,
        );
        if !stored {
            // Cancelled mid-chunk; the partial file stays on disk.
            return session_error_response(SessionError::SessionNotFound);
        }
        state
            .observer
            .progress(progress_event(&file, total_received, started_at, None));
        return (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Chunk received",
                "bytesReceived": total_received,
                "totalBytes": file.size,
            })),
        )
            .into_response();
    }

    // Terminal chunk: close the handle, verify, account, report.
    drop(writer);

    if let Some(expected) = &file.sha256 {
        verify_sha256(&dest, expected).await;
    }

    let elapsed = started_at.elapsed().as_secs_f64();
    let average_speed = if elapsed > 0.0 {
        total_received as f64 / elapsed
    } else {
        0.0
    };
    state.observer.progress(progress_event(
        &file,
        total_received,
        started_at,
        Some(CompletionInfo {
            file_path: dest.clone(),
            total_time_seconds: elapsed,
            average_speed,
        }),
    ));

    let destroyed = state.sessions.complete_file(&query.session_id, &query.file_id);
    info!(
        file = %file.file_name,
        bytes = total_received,
        session_done = destroyed,
        "file received"
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({ "message": "File received" })),
    )
        .into_response()
}

/// POST /api/localsend/v2/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(_) => return message_response(StatusCode::BAD_REQUEST, "sessionId is required"),
    };

    // Cancelling an unknown session is indistinguishable from cancelling
    // one twice; both answer 200.
    state.sessions.cancel(&query.session_id);
    (
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Session canceled" })),
    )
        .into_response()
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(axum::http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Open the destination for this chunk: offset 0 truncates, a later
/// offset appends (reopening when the previous handle was closed).
async fn open_writer(
    taken: Option<tokio::fs::File>,
    save_dir: &Path,
    dest: &Path,
    start: u64,
) -> std::io::Result<tokio::fs::File> {
    if start == 0 {
        tokio::fs::create_dir_all(save_dir).await?;
        drop(taken);
        return tokio::fs::File::create(dest).await;
    }
    match taken {
        Some(writer) => Ok(writer),
        None => {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(dest)
                .await
        }
    }
}

fn progress_event(
    file: &FileInfo,
    bytes_received: u64,
    started_at: Instant,
    completion: Option<CompletionInfo>,
) -> ProgressEvent {
    let elapsed = started_at.elapsed().as_secs_f64();
    let bytes_per_second = if elapsed > 0.0 {
        bytes_received as f64 / elapsed
    } else {
        0.0
    };
    ProgressEvent {
        file_id: file.id.clone(),
        file_name: file.file_name.clone(),
        bytes_received,
        total_bytes: file.size,
        bytes_per_second,
        finished: completion.is_some(),
        completion,
    }
}

/// Check the written bytes against the descriptor's digest. The chunks
/// are already acknowledged, so a mismatch only warns.
async fn verify_sha256(path: &Path, expected: &str) {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return;
    };
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match file.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(_) => return,
        }
    }
    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected) {
        warn!(
            path = %path.display(),
            expected = %expected,
            actual = %actual,
            "sha256 mismatch on received file"
        );
    }
}
