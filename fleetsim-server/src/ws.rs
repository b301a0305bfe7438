// Fleetsim Server - WebSocket live subscribers
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Each socket is one live subscriber backed by a bounded queue. Frames are the
//! tagged broadcast messages (`sensor_reading` / `sensor_states`) as JSON text.
//! Anything the client sends is ignored apart from close frames.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use fleetsim::Engine;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: Arc<AppState>) {
    let (outgoing, incoming) = socket.split();
    bridge(outgoing, incoming, &state.engine, state.queue_depth).await;
}

/// Pump broadcasts into `outgoing` until the client or the registry hangs up
async fn bridge<O, I, E>(mut outgoing: O, mut incoming: I, engine: &Engine, queue_depth: usize)
where
    O: Sink<Message> + Unpin,
    I: Stream<Item = Result<Message, E>> + Unpin,
{
    let (handle, mut queue) = engine.subscribe(queue_depth).await;
    info!(subscriber = %handle, "Live subscriber connected");

    loop {
        tokio::select! {
            message = queue.recv() => {
                // None: the registry dropped this subscriber after a failed push
                let Some(message) = message else { break };
                let text = match serde_json::to_string(message.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(subscriber = %handle, "Failed to encode broadcast: {}", e);
                        continue;
                    }
                };
                if outgoing.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => debug!(subscriber = %handle, "Ignoring client frame"),
            },
        }
    }

    engine.unsubscribe(handle).await;
    info!(subscriber = %handle, "Live subscriber disconnected");
}
