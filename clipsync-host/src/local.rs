use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use clipsync_core::{CallError, Command, Subscription, Topic, Transport};
use serde_json::Value;

use crate::host::Host;

/// In-process binding of a window to a [`Host`], without a socket in between.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    host: Host,
    connected: Arc<AtomicBool>,
}

impl LocalTransport {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates losing the host: later calls and subscriptions fail with
    /// `BackendUnavailable`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), CallError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CallError::BackendUnavailable("host is not running".to_owned()))
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, command: Command) -> Result<Value, CallError> {
        self.ensure_connected()?;
        self.host.execute(command).await
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, CallError> {
        self.ensure_connected()?;
        Ok(self.host.bus().subscribe(topic))
    }
}
