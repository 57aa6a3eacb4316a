//! WebSocket transport for browser consoles.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::{
    dispatcher::{BridgeState, Dispatcher},
    protocol::{ClientMessage, ServerMessage},
};

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BridgeState) {
    let (mut sender, mut receiver) = socket.split();

    // Replies and channel output share one queue so they stay ordered.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let dispatcher = Arc::new(Dispatcher::new(state, tx.clone()));

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                let _ = tx.send(ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                });
                continue;
            }
        };

        // Commands block on the invocation lock; keep them off the reactor.
        let worker = Arc::clone(&dispatcher);
        match tokio::task::spawn_blocking(move || worker.handle(client_msg)).await {
            Ok(reply) => {
                if tx.send(reply).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Request handler panicked: {e}");
                let _ = tx.send(ServerMessage::Error {
                    message: "Internal error".to_string(),
                });
            }
        }
    }

    let worker = Arc::clone(&dispatcher);
    if let Err(e) = tokio::task::spawn_blocking(move || worker.disconnect()).await {
        tracing::error!("Failed to close channels: {e}");
    }
    drop(tx);
    drop(dispatcher);
    send_task.abort();
}

/// Create WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(state));
/// ```
#[must_use]
pub fn create_ws_router(state: BridgeState) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
