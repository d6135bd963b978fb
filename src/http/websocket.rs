//! Live reload WebSocket upgrade.
//!
//! # Responsibilities
//! - Complete the upgrade handshake on `/ws`
//! - Hand the socket to the reload client task
//! - Answer a plain HTTP request on `/ws` with 400
//!
//! # Data Flow
//! ```text
//! Browser ── GET /ws (Upgrade) ──→ upgrade() ──→ reload::serve_client
//! ```

use axum::{
    extract::{ws::WebSocketUpgrade, FromRequestParts, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::reload::serve_client;

pub async fn upgrade(state: &AppState, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();

    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, state).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "Rejected non-WebSocket request on /ws");
            return (StatusCode::BAD_REQUEST, "Expected a WebSocket upgrade").into_response();
        }
    };

    if state.inner.shutdown.is_triggered() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    }

    let channel = state.inner.channel.clone();
    let heartbeat = state.inner.config.reload.heartbeat();
    ws.on_upgrade(move |socket| serve_client(socket, channel, heartbeat))
}
