use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use clipsync_core::{CallOutcome, ClientFrame, HostFrame, decode_frame, encode_frame};
use futures::{SinkExt, StreamExt};
use tokio::{
    net::TcpListener,
    sync::{broadcast::error::RecvError, mpsc},
};
use tracing::{debug, info, warn};

use crate::host::Host;

/// Largest inbound frame accepted from a window. A full settings form is far
/// below this.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub fn build_router(host: Host) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(host)
}

pub async fn serve(listener: TcpListener, host: Host) -> Result<(), String> {
    info!(
        "host listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned())
    );
    axum::serve(listener, build_router(host))
        .await
        .map_err(|err| err.to_string())
}

async fn healthz_handler() -> impl IntoResponse {
    Json(serde_json::json!({"ok": true}))
}

async fn ws_handler(ws: WebSocketUpgrade, State(host): State<Host>) -> impl IntoResponse {
    ws.max_frame_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(host, socket))
}

async fn handle_socket(host: Host, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<HostFrame>();

    // Split sockets only flush queued pongs when the write half sends, so the
    // writer also pings on a timer.
    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match encode_frame(&frame) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!("failed to encode host frame: {}", err);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Subscribed before the first call is read, so a window that bootstraps
    // over this socket cannot miss an event published after its reply.
    let mut events = host.bus().receiver();
    let event_tx = outbound_tx.clone();
    let fanout_task = tokio::spawn(async move {
        loop {
            let frame = match events.recv().await {
                Ok(event) => HostFrame::Event { event },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "window connection fell behind the event bus");
                    HostFrame::Missed { skipped }
                }
                Err(RecvError::Closed) => break,
            };
            if event_tx.send(frame).is_err() {
                break;
            }
        }
    });

    info!("window connected");

    while let Some(next_message) = ws_receiver.next().await {
        let message = match next_message {
            Ok(message) => message,
            Err(err) => {
                warn!("websocket receive error: {}", err);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let frame = match decode_frame::<ClientFrame>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!("failed to decode window frame: {}", err);
                        continue;
                    }
                };
                let ClientFrame::Call { id, request } = frame;
                debug!(id, command = request.name(), "call received");

                let host = host.clone();
                let reply_tx = outbound_tx.clone();
                tokio::spawn(async move {
                    let outcome = CallOutcome::from(host.execute(request).await);
                    let _ = reply_tx.send(HostFrame::Reply { id, outcome });
                });
            }
            Message::Close(_) => break,
            Message::Binary(_) => warn!("ignoring binary frame from window"),
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    fanout_task.abort();
    send_task.abort();
    info!("window disconnected");
}
