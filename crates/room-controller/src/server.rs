//! WebSocket transport layer.
//!
//! One upgraded socket per connection. Inbound text frames are decoded as
//! [`ClientCommand`]s and fed to the coordinator; outbound [`ServerEvent`]s
//! arrive on a per-connection unbounded channel and are pushed to the sink by
//! a dedicated task. Malformed frames are dropped without a reply.

use crate::actors::{ClientCommand, CoordinatorActorHandle, ServerEvent};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared state for the WebSocket routes.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorActorHandle,
}

/// Build the router exposing the signaling endpoint.
pub fn router(coordinator: CoordinatorActorHandle) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { coordinator })
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that drains the outbound channel and pushes serialized
/// events to the WebSocket sink.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();

    if let Err(e) = state.coordinator.connect(connection_id.clone(), tx).await {
        warn!(
            connection_id = %connection_id,
            error = %e,
            "Failed to register connection"
        );
        return;
    }
    info!(connection_id = %connection_id, "Client connected");

    let (sender, mut receiver) = socket.split();
    let mut send_task = pusher_loop(rx, sender);

    let coordinator = state.coordinator.clone();
    let recv_connection_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(
                        connection_id = %recv_connection_id,
                        error = %e,
                        "WebSocket error"
                    );
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let command = match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(command) => command,
                        Err(e) => {
                            debug!(
                                connection_id = %recv_connection_id,
                                error = %e,
                                "Malformed command dropped"
                            );
                            continue;
                        }
                    };
                    if coordinator
                        .command(recv_connection_id.clone(), command)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Message::Close(_) => {
                    debug!(connection_id = %recv_connection_id, "Client requested close");
                    break;
                }
                // Ping/pong is handled by the protocol layer.
                _ => {}
            }
        }
    });

    // If either direction ends, tear down the other.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    if let Err(e) = state.coordinator.disconnect(connection_id.clone()).await {
        warn!(
            connection_id = %connection_id,
            error = %e,
            "Failed to deregister connection"
        );
    }
    info!(connection_id = %connection_id, "Client disconnected");
}
