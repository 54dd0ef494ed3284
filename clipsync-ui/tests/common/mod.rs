#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use clipsync_core::{
    BackendClient, CallError, Command, ConfigSnapshot, ConnectionMode, Subscription, Topic,
    Transport, WindowLabel,
};
use clipsync_host::{Host, HostOptions, LocalTransport};
use clipsync_ui::{
    FrontEnd, HeadlessWindows, WindowError, WindowExit, WindowHost, WindowId, WindowSpec,
};
use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    time::timeout,
};

/// Wraps a transport, counting live subscriptions and issued commands, and
/// optionally failing saves.
pub struct CountingTransport<T> {
    inner: T,
    live: Arc<AtomicUsize>,
    fail_saves: AtomicBool,
    commands: Mutex<Vec<&'static str>>,
}

impl<T> CountingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            live: Arc::new(AtomicUsize::new(0)),
            fail_saves: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn live_subscriptions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// How many times a command with this wire name was issued.
    pub fn calls_named(&self, name: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|issued| **issued == name)
            .count()
    }
}

#[async_trait]
impl<T: Transport> Transport for CountingTransport<T> {
    async fn call(&self, command: Command) -> Result<Value, CallError> {
        self.commands.lock().unwrap().push(command.name());
        if self.fail_saves.load(Ordering::SeqCst) && matches!(command, Command::SaveSettings { .. })
        {
            return Err(CallError::BackendUnavailable("host stopped answering".to_owned()));
        }
        self.inner.call(command).await
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, CallError> {
        let subscription = self.inner.subscribe(topic).await?;
        self.live.fetch_add(1, Ordering::SeqCst);
        let live = Arc::clone(&self.live);
        Ok(subscription.on_cancel(move || {
            live.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}

/// Headless windows where creating one label always fails.
pub struct RefusingWindows {
    inner: HeadlessWindows,
    refused: WindowLabel,
}

impl RefusingWindows {
    pub fn new(refused: WindowLabel) -> Self {
        Self {
            inner: HeadlessWindows::new(),
            refused,
        }
    }
}

impl WindowHost for RefusingWindows {
    fn create(&self, spec: &WindowSpec) -> Result<WindowId, WindowError> {
        if spec.label == self.refused {
            return Err(WindowError::Create {
                label: spec.label,
                reason: "no display".to_owned(),
            });
        }
        self.inner.create(spec)
    }

    fn focus(&self, id: WindowId) -> Result<(), WindowError> {
        self.inner.focus(id)
    }

    fn is_alive(&self, id: WindowId) -> bool {
        self.inner.is_alive(id)
    }

    fn hide(&self, id: WindowId) -> Result<(), WindowError> {
        self.inner.hide(id)
    }

    fn minimize(&self, id: WindowId) -> Result<(), WindowError> {
        self.inner.minimize(id)
    }

    fn close(&self, id: WindowId) -> Result<(), WindowError> {
        self.inner.close(id)
    }
}

pub struct Harness<H = HeadlessWindows> {
    pub host: Host,
    pub transport: Arc<CountingTransport<LocalTransport>>,
    pub front: FrontEnd<H>,
    pub exits: mpsc::UnboundedReceiver<(WindowLabel, WindowExit)>,
}

pub fn harness() -> Harness {
    harness_with(HeadlessWindows::new())
}

pub fn harness_with<H: WindowHost + 'static>(windows: H) -> Harness<H> {
    let host = Host::new(HostOptions::default());
    let transport = Arc::new(CountingTransport::new(LocalTransport::new(host.clone())));
    let client = BackendClient::new(transport.clone());
    let (front, exits) = FrontEnd::new(client, windows);
    Harness {
        host,
        transport,
        front,
        exits,
    }
}

pub fn server_config() -> ConfigSnapshot {
    ConfigSnapshot {
        server_url: "wss://relay.example.net/ws".to_owned(),
        token: "secret".to_owned(),
        ..ConfigSnapshot::default()
    }
}

pub fn lan_config() -> ConfigSnapshot {
    ConfigSnapshot {
        connection_mode: ConnectionMode::Lan,
        lan_device_name: "desk".to_owned(),
        ..server_config()
    }
}

/// Waits until the window view satisfies `done` and returns it.
pub async fn wait_for<V: Clone>(view: &mut watch::Receiver<V>, done: impl Fn(&V) -> bool) -> V {
    timeout(Duration::from_secs(3), async {
        loop {
            {
                let current = view.borrow_and_update();
                if done(&current) {
                    return current.clone();
                }
            }
            view.changed().await.expect("window still running");
        }
    })
    .await
    .expect("view reached expected state")
}

/// Polls `done` until it holds.
pub async fn eventually(done: impl Fn() -> bool) {
    timeout(Duration::from_secs(3), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}
