//! WebSocket binding of the [`Transport`] boundary.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use clipsync_core::{
    CallError, CallOutcome, ClientFrame, Command, Delivery, HostFrame, Subscription, Topic,
    Transport, decode_frame, encode_frame,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 200;

/// Events buffered per subscriber before it is reported as lagging.
const DELIVERY_BUFFER: usize = 512;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type PendingCalls = HashMap<u64, oneshot::Sender<CallOutcome>>;

#[derive(Default)]
struct Connection {
    closed: bool,
    pending: PendingCalls,
    deliveries: Option<broadcast::Sender<Delivery>>,
}

impl Connection {
    /// Fails every in-flight call and ends every subscription stream.
    fn close(&mut self) {
        self.closed = true;
        let failed = self.pending.len();
        // Dropping the senders resolves the waiting calls as unavailable.
        self.pending.clear();
        self.deliveries = None;
        if failed > 0 {
            warn!(failed, "connection lost with calls in flight");
        }
    }
}

/// Drops a call's pending entry once the caller stops waiting, whether the
/// reply arrived or the call future was abandoned.
struct PendingCall {
    id: u64,
    connection: Arc<Mutex<Connection>>,
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if let Ok(mut connection) = self.connection.lock() {
            connection.pending.remove(&self.id);
        }
    }
}

pub struct WsTransport {
    url: String,
    next_id: AtomicU64,
    connection: Arc<Mutex<Connection>>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl WsTransport {
    /// Connects to the host, retrying with exponential backoff.
    pub async fn connect(url: &str) -> Result<Self, CallError> {
        Url::parse(url).map_err(|err| {
            error!(url, "invalid host url: {err}");
            CallError::BackendUnavailable(format!("invalid host URL: {err}"))
        })?;

        let mut attempt: u32 = 1;
        let ws_stream = loop {
            info!(attempt, max_attempts = MAX_CONNECT_ATTEMPTS, url, "connecting to host");

            let failure = match timeout(CONNECT_TIMEOUT, connect_async(url)).await {
                Ok(Ok((stream, _))) => break stream,
                Ok(Err(err)) => format!("connect failed: {err}"),
                Err(_) => format!("connect timed out after {CONNECT_TIMEOUT:?}"),
            };
            error!(attempt, url, "{failure}");
            if attempt >= MAX_CONNECT_ATTEMPTS {
                return Err(CallError::BackendUnavailable(failure));
            }

            let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            attempt += 1;
        };

        info!(url, "connected to host");
        Ok(Self::from_stream(url, ws_stream))
    }

    fn from_stream(url: &str, ws_stream: WsStream) -> Self {
        let (write_half, read_half) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (deliveries_tx, _) = broadcast::channel(DELIVERY_BUFFER);

        let connection = Arc::new(Mutex::new(Connection {
            closed: false,
            pending: HashMap::new(),
            deliveries: Some(deliveries_tx.clone()),
        }));

        let send_task = tokio::spawn(send_task(write_half, outbound_rx));
        let receive_task = tokio::spawn(receive_task(
            read_half,
            Arc::clone(&connection),
            deliveries_tx,
        ));

        Self {
            url: url.to_owned(),
            next_id: AtomicU64::new(1),
            connection,
            outbound: outbound_tx,
            tasks: vec![send_task, receive_task],
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .map(|connection| !connection.closed)
            .unwrap_or(false)
    }

    #[cfg(test)]
    fn pending_calls(&self) -> usize {
        self.connection
            .lock()
            .map(|connection| connection.pending.len())
            .unwrap_or(0)
    }

    fn unavailable() -> CallError {
        CallError::BackendUnavailable("connection to host closed".to_owned())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn call(&self, command: Command) -> Result<Value, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = command.name();
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut connection = self.connection.lock().map_err(|_| Self::unavailable())?;
            if connection.closed {
                return Err(Self::unavailable());
            }
            connection.pending.insert(id, reply_tx);
        }
        let _pending = PendingCall {
            id,
            connection: Arc::clone(&self.connection),
        };

        if self
            .outbound
            .send(ClientFrame::Call { id, request: command })
            .is_err()
        {
            return Err(Self::unavailable());
        }
        debug!(id, command = name, "call sent");

        match reply_rx.await {
            Ok(outcome) => outcome.into_result(),
            Err(_) => Err(Self::unavailable()),
        }
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, CallError> {
        let receiver = {
            let connection = self.connection.lock().map_err(|_| Self::unavailable())?;
            match &connection.deliveries {
                Some(deliveries) => deliveries.subscribe(),
                None => return Err(Self::unavailable()),
            }
        };

        let stream = BroadcastStream::new(receiver)
            .filter_map(move |item| async move {
                match item {
                    Ok(Delivery::Event(event)) if event.topic != topic => None,
                    Ok(delivery) => Some(delivery),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        Some(Delivery::Missed(skipped))
                    }
                }
            })
            .boxed();
        Ok(Subscription::new(topic, stream))
    }
}

async fn send_task(
    mut write_half: futures::stream::SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        let text = match encode_frame(&frame) {
            Ok(text) => text,
            Err(err) => {
                warn!("failed to encode call frame: {}", err);
                continue;
            }
        };
        if let Err(err) = write_half.send(Message::Text(text.into())).await {
            warn!("websocket send failed: {}", err);
            break;
        }
    }
}

async fn receive_task(
    mut read_half: futures::stream::SplitStream<WsStream>,
    connection: Arc<Mutex<Connection>>,
    deliveries: broadcast::Sender<Delivery>,
) {
    while let Some(next) = read_half.next().await {
        let message = match next {
            Ok(message) => message,
            Err(err) => {
                warn!("websocket receive error: {}", err);
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame = match decode_frame::<HostFrame>(text.as_str()) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("failed to decode host frame: {}", err);
                continue;
            }
        };

        match frame {
            HostFrame::Reply { id, outcome } => {
                let waiter = connection
                    .lock()
                    .ok()
                    .and_then(|mut connection| connection.pending.remove(&id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(outcome);
                    }
                    None => debug!(id, "reply for unknown call"),
                }
            }
            HostFrame::Event { event } => {
                let _ = deliveries.send(Delivery::Event(event));
            }
            HostFrame::Missed { skipped } => {
                let _ = deliveries.send(Delivery::Missed(skipped));
            }
        }
    }

    info!("host connection closed");
    if let Ok(mut connection) = connection.lock() {
        connection.close();
    }
}
