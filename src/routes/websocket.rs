use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::AppState;
use crate::error::AppError;
use crate::middleware::{JwtPayload, decode_jwt};

/// Browsers cannot set headers on a WebSocket handshake, so the session may
/// also arrive as `?token=`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamAuth {
    /// Session JWT for the owner
    pub token: Option<String>,
}

/// Why a stream ended; logged on disconnect.
#[derive(Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum StreamEnd {
    ClientClosed,
    SendFailed,
    ChannelClosed,
    SessionExpired,
}

// GET /notifications/ws/{owner_id}
#[utoipa::path(
    get,
    path = "/notifications/ws/{owner_id}",
    params(
        ("owner_id" = String, Path, description = "Owner whose notifications are streamed"),
        StreamAuth
    ),
    responses(
        (status = 101, description = "Switching to WebSocket; frames are {\"event\":\"notification\",\"data\":NotificationRecord}"),
        (status = 401, body = crate::error::ErrorBody, description = "Missing or invalid session"),
        (status = 403, body = crate::error::ErrorBody, description = "Session belongs to another owner")
    ),
    tag = "Realtime",
    security(("BearerAuth" = []))
)]
pub async fn ws_notifications(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(auth): Query<StreamAuth>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let session = authorize_stream(&state, &owner_id, auth.token.as_deref(), &headers)?;
    let expires_in = Duration::from_secs(
        session
            .exp
            .saturating_sub(chrono::Utc::now().timestamp().max(0) as u64),
    );

    Ok(ws.on_upgrade(move |socket| stream_notifications(state, owner_id, expires_in, socket)))
}

/// The session must belong to the owner being streamed.
fn authorize_stream(
    state: &AppState,
    owner_id: &str,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<JwtPayload, AppError> {
    let header_token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let token = query_token
        .filter(|t| !t.is_empty())
        .or(header_token)
        .ok_or_else(|| AppError::unauthorized("Missing session token"))?;

    let session = decode_jwt(token, &state.settings)?;
    if session.sub != owner_id {
        tracing::warn!(
            owner_id = %owner_id,
            session_sub = %session.sub,
            "Rejected realtime stream for another owner"
        );
        return Err(AppError::forbidden(
            "Cannot stream another user's notifications",
        ));
    }
    Ok(session)
}

async fn stream_notifications(
    state: Arc<AppState>,
    owner_id: String,
    expires_in: Duration,
    mut socket: WebSocket,
) {
    let (conn_id, mut frames) = state.ws_manager.connect(&owner_id);
    tracing::info!(owner_id = %owner_id, conn_id = conn_id, "Realtime stream opened");

    let session_expiry = tokio::time::sleep(expires_in);
    tokio::pin!(session_expiry);

    let end = loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(text) = frame else {
                    break StreamEnd::ChannelClosed;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break StreamEnd::SendFailed;
                }
            }
            incoming = socket.recv() => {
                // Pings are answered by axum; anything else from the client is ignored
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break StreamEnd::ClientClosed,
                    Some(Ok(_)) => {}
                }
            }
            () = &mut session_expiry => {
                let close = CloseFrame {
                    code: close_code::POLICY,
                    reason: "session expired".into(),
                };
                socket.send(Message::Close(Some(close))).await.ok();
                break StreamEnd::SessionExpired;
            }
        }
    };

    state.ws_manager.disconnect(&owner_id, conn_id);
    tracing::info!(
        owner_id = %owner_id,
        conn_id = conn_id,
        reason = %end,
        "Realtime stream closed"
    );
}
