//! STOMP-over-WebSocket endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{mpsc, OwnedSemaphorePermit};

use crate::relay::DrawEvent;
use crate::stomp::{parse_frames, Frame};
use crate::web::state::AppState;
use crate::RelayError;

use super::session::{Outbound, StompSession};

type WsSender = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler.
///
/// GET /canvaWs (and /canvaWs/websocket for SockJS-style clients)
///
/// Requests that are not a valid upgrade get a 400; a full server gets a 503.
pub async fn stomp_ws_handler(
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!("WebSocket upgrade rejected: {}", rejection.body_text());
            return RelayError::ProtocolUpgrade(rejection.body_text()).into_response();
        }
    };

    let Some(slot) = state.try_acquire_slot() else {
        tracing::warn!(
            max_connections = state.max_connections(),
            "Connection limit reached, refusing WebSocket"
        );
        return RelayError::TooManyConnections.into_response();
    };

    ws.max_message_size(max_message_bytes(state.relay.max_frame_bytes))
        .on_upgrade(move |socket| handle_socket(socket, state, slot))
}

/// Frames a single WebSocket message may batch.
const FRAMES_PER_MESSAGE: usize = 16;

/// Largest WebSocket message accepted for a given frame limit.
fn max_message_bytes(max_frame_bytes: usize) -> usize {
    max_frame_bytes.saturating_mul(FRAMES_PER_MESSAGE)
}

/// Drive one STOMP session until either side closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, _slot: OwnedSemaphorePermit) {
    let max_frame_bytes = state.relay.max_frame_bytes;
    let mut session = StompSession::new(Arc::clone(&state));
    let session_id = session.id();
    tracing::info!(connection = %session_id, "WebSocket session started");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut outbound: Option<mpsc::Receiver<DrawEvent>> = None;

    'session: loop {
        tokio::select! {
            // Frames from the client
            msg = ws_receiver.next() => {
                let data = match msg {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(data))) => data,
                    // Pongs are answered by the WebSocket layer itself.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection = %session_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection = %session_id, "WebSocket error: {}", e);
                        break;
                    }
                };

                let frames = match parse_frames(&data, max_frame_bytes) {
                    Ok(frames) => frames,
                    Err(e) => {
                        let err = RelayError::from(e);
                        tracing::warn!(connection = %session_id, error = %err, "Rejecting malformed frame");
                        let _ = send_frame(&mut ws_sender, &Frame::error("malformed frame", err.to_string())).await;
                        break;
                    }
                };

                for frame in frames {
                    let reply = session.handle_frame(frame).await;
                    match reply.outbound {
                        Outbound::Keep => {}
                        Outbound::Attach(rx) => outbound = Some(rx),
                        Outbound::Detach => outbound = None,
                    }
                    for frame in &reply.frames {
                        if send_frame(&mut ws_sender, frame).await.is_err() {
                            break 'session;
                        }
                    }
                    if reply.close {
                        break 'session;
                    }
                }
            }

            // Deliveries from the router
            event = async {
                match outbound.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending::<Option<DrawEvent>>().await,
                }
            } => {
                match event {
                    Some(event) => {
                        if let Some(frame) = session.message_frame(&event) {
                            if send_frame(&mut ws_sender, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => {
                        // Every sender is gone: the router evicted this session.
                        let frame = session.evicted();
                        let _ = send_frame(&mut ws_sender, &frame).await;
                        break;
                    }
                }
            }
        }
    }

    session.close().await;
    let _ = ws_sender.close().await;
    tracing::info!(connection = %session_id, "WebSocket session ended");
}

/// Write one frame. Text when the encoding is UTF-8, binary otherwise.
async fn send_frame(ws_sender: &mut WsSender, frame: &Frame) -> Result<(), axum::Error> {
    let message = match String::from_utf8(frame.to_bytes()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    };
    ws_sender.send(message).await
}
