//! WebSocket transport: each connection is one subscriber.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use codestream_core::PipelineHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared across handlers.
#[derive(Clone)]
pub struct TransportState {
    pub handle: PipelineHandle,
    pub cancel: CancellationToken,
}

/// Build the HTTP router.
pub fn router(state: TransportState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Handle WebSocket upgrade request.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<TransportState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pump records from the pipeline to the socket until either side closes.
async fn handle_socket(mut socket: WebSocket, state: TransportState) {
    let (id, mut rx) = match state.handle.subscribe() {
        Ok(subscribed) => subscribed,
        Err(e) => {
            warn!("Rejecting connection: {e}");
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    };
    info!(subscriber = id, "WebSocket connected");

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => {
                let _ = socket.send(WsMessage::Close(None)).await;
                break;
            }

            outgoing = rx.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = socket.send(WsMessage::Text(text.to_string().into())).await {
                        debug!(subscriber = id, "Failed to send WebSocket message: {e}");
                        break;
                    }
                }
                // The pipeline dropped this subscriber: closed or too slow.
                None => break,
            },

            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(subscriber = id, "Client closed connection");
                    break;
                }
                Some(Err(e)) => {
                    debug!(subscriber = id, "WebSocket error: {e}");
                    break;
                }
                // Subscribers only listen; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }

    if state.handle.unsubscribe(id).is_err() {
        debug!(subscriber = id, "Pipeline already stopped");
    }
}
