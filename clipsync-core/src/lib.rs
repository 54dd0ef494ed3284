//! Shared model and protocol for ClipSync windows and the host that owns
//! the authoritative state.

pub mod log_buffer;
pub mod model;
pub mod protocol;
pub mod transport;

use thiserror::Error;

pub use log_buffer::{LOG_BUFFER_CAPACITY, LogBuffer};
pub use model::{
    ClipboardActivity, ClipboardDirection, CloseBehavior, ConfigSnapshot, ConnectionMode, ConnectionPhase, ConnectionState, DeviceId,
    InitialState, Language, LogEntry, MaterialEffect, PeerEntry, ThemeMode, WindowLabel,
};
pub use protocol::{
    CallOutcome, ClientFrame, Command, HostFrame, PushEvent, RawEvent, Topic, TraySignal,
    decode_frame, decode_roster, encode_frame, encode_roster,
};
pub use transport::{BackendClient, Delivery, Subscription, SubscriptionSet, Transport};

/// Failure of a request/response call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The host rejected the request; the message is meant for the user.
    #[error("{0}")]
    Command(String),
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed {topic} payload: {reason}")]
    MalformedPayload { topic: Topic, reason: String },
    #[error("serialization error: {0}")]
    Serialization(String),
}
