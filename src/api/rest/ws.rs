use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::engine::coordinator::RideEvent;
use crate::error::AppError;
use crate::models::ride::ActiveRide;
use crate::state::AppState;

/// Streams the signed-in actor's ride events. The socket closes when the
/// session's coordinator stops.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.view().await?;
    let coordinator = view.coordinator().ok_or_else(|| {
        AppError::Forbidden("admin sessions have no ride stream".to_string())
    })?;

    let current = coordinator.active();
    let events = coordinator.subscribe();
    drop(view);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, current, events)))
}

async fn handle_socket(
    socket: WebSocket,
    current: Option<ActiveRide>,
    mut events: broadcast::Receiver<RideEvent>,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        if let Some(active) = current {
            if !send_event(&mut sender, &RideEvent::Tracked { active }).await {
                return;
            }
        }

        loop {
            match events.recv().await {
                Ok(event) => {
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging behind ride events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &RideEvent,
) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize ride event for ws");
            return true;
        }
    };

    sender.send(Message::Text(json)).await.is_ok()
}
