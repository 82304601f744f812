/// HTTP routes
///
/// - `GET <path>`: WebSocket upgrade into the hub
/// - `GET /health`: hub counters as JSON
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::logger::{self, LogTag};
use crate::ws::{Hub, UpgradeRequest};

pub fn create_router(hub: Arc<Hub>, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .route("/health", get(health))
        .with_state(hub)
}

/// Upgrade and hand the socket to the hub
///
/// Authentication runs after the upgrade so a refused client still gets a
/// close frame explaining why.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    uri: Uri,
    State(hub): State<Arc<Hub>>,
) -> Response {
    logger::debug(LogTag::Webserver, &format!("upgrade request on {}", uri));
    if logger::enabled(LogTag::Webserver, logger::LogLevel::Verbose) {
        logger::verbose(LogTag::Webserver, &format!("upgrade headers: {:?}", headers));
    }

    let write_buffer_size = hub.conf().write_buffer_size;
    let max_message_size = hub.conf().max_message_size;
    let request = UpgradeRequest::new(headers, uri);
    ws.write_buffer_size(write_buffer_size)
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| async move { hub.accept(socket, request).await })
}

async fn health(State(hub): State<Arc<Hub>>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "hub": hub.metrics().snapshot(),
    }))
    .into_response()
}
