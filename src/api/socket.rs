//! `GET /ws` - live relay for dashboard clients and telemetry producers.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    ingest,
    relay::{ClientMessage, ServerMessage},
    state::AppState,
};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    info!(%client_id, "socket client connected");

    let (mut sink, mut stream) = socket.split();
    let mut updates = state.relay.subscribe();
    // replies to this client only
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(16);

    let mut writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                update = updates.recv() => match update {
                    Ok(update) => ServerMessage::LocationUpdate(update),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%client_id, skipped, "socket client lagging, updates dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(%client_id, error = %e, "failed to encode socket frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut reader = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::LocationUpdate(update)) => {
                    state.relay.publish(update);
                    None
                }
                Ok(ClientMessage::SensorReading(packet)) => {
                    match ingest::record_packet(state.store.as_ref(), &state.relay, &packet).await {
                        Ok(outcome) => Some(ServerMessage::Ack {
                            serial_number: packet.serial_number,
                            location_id: outcome.location.location_id,
                        }),
                        Err(e) => {
                            warn!(%client_id, serial = %packet.serial_number, error = %e, "socket sensor reading rejected");
                            Some(ServerMessage::Error { message: e.to_string() })
                        }
                    }
                }
                Err(e) => {
                    debug!(%client_id, error = %e, "unparseable socket frame");
                    Some(ServerMessage::Error {
                        message: format!("unrecognised frame: {e}"),
                    })
                }
            };

            if let Some(reply) = reply {
                if reply_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }
    info!(%client_id, "socket client disconnected");
}
