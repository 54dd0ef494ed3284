use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream::BoxStream};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{
    CallError,
    model::{ConfigSnapshot, InitialState, MaterialEffect, ThemeMode},
    protocol::{Command, RawEvent, Topic},
};

/// One item yielded by a push subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(RawEvent),
    /// The subscriber fell behind and `n` events were dropped for it.
    Missed(u64),
}

/// The call/subscribe boundary between a window and the host.
///
/// Calls are independent of each other and may run concurrently. A
/// subscription only yields events published after it was opened.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, command: Command) -> Result<Value, CallError>;

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, CallError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(&self, command: Command) -> Result<Value, CallError> {
        (**self).call(command).await
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, CallError> {
        (**self).subscribe(topic).await
    }
}

type CancelHook = Box<dyn FnOnce() + Send>;

/// Handle to an open push subscription.
///
/// Unsubscribing is idempotent and also happens on drop, so every teardown
/// path releases the underlying listener.
pub struct Subscription {
    topic: Topic,
    stream: Option<BoxStream<'static, Delivery>>,
    on_cancel: Option<CancelHook>,
}

impl Subscription {
    pub fn new(topic: Topic, stream: BoxStream<'static, Delivery>) -> Self {
        Self {
            topic,
            stream: Some(stream),
            on_cancel: None,
        }
    }

    /// Runs `hook` exactly once when the subscription is released.
    #[must_use]
    pub fn on_cancel(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if self.stream.take().is_some() {
            debug!(topic = %self.topic, "unsubscribed");
        }
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Delivery>> {
        let polled = match self.stream.as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => return Poll::Ready(None),
        };
        if let Poll::Ready(None) = polled {
            self.unsubscribe();
        }
        polled
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// All subscriptions owned by one window, polled as a single source.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
    cursor: usize,
}

impl SubscriptionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn active_count(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Next delivery from any member; `None` once every member has ended.
    pub async fn next(&mut self) -> Option<Delivery> {
        std::future::poll_fn(|cx| self.poll_next_delivery(cx)).await
    }

    pub fn poll_next_delivery(&mut self, cx: &mut Context<'_>) -> Poll<Option<Delivery>> {
        let count = self.subscriptions.len();
        let mut pending = false;
        for step in 0..count {
            let index = (self.cursor + step) % count;
            match self.subscriptions[index].poll_next_unpin(cx) {
                Poll::Ready(Some(delivery)) => {
                    self.cursor = (index + 1) % count;
                    return Poll::Ready(Some(delivery));
                }
                Poll::Ready(None) => {}
                Poll::Pending => pending = true,
            }
        }
        if pending {
            Poll::Pending
        } else {
            Poll::Ready(None)
        }
    }

    /// Cancels every member. Safe to call more than once.
    pub fn cancel_all(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.unsubscribe();
        }
        self.subscriptions.clear();
        self.cursor = 0;
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Typed wrappers over the raw command surface.
#[derive(Clone)]
pub struct BackendClient {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call_typed<R: DeserializeOwned>(&self, command: Command) -> Result<R, CallError> {
        let name = command.name();
        let value = self.transport.call(command).await?;
        serde_json::from_value(value).map_err(|err| CallError::MalformedReply(format!("{name}: {err}")))
    }

    pub async fn get_initial_state(&self) -> Result<InitialState, CallError> {
        self.call_typed(Command::GetInitialState).await
    }

    pub async fn save_settings(&self, form: ConfigSnapshot) -> Result<(), CallError> {
        self.call_typed(Command::SaveSettings { form }).await
    }

    pub async fn toggle_pause(&self) -> Result<(), CallError> {
        self.call_typed(Command::TogglePause).await
    }

    pub async fn apply_window_effects(
        &self,
        effect: MaterialEffect,
        theme: ThemeMode,
    ) -> Result<(), CallError> {
        self.call_typed(Command::ApplyWindowEffects { effect, theme })
            .await
    }

    pub async fn open_log_folder(&self) -> Result<(), CallError> {
        self.call_typed(Command::OpenLogFolder).await
    }

    pub async fn get_hostname(&self) -> Result<String, CallError> {
        self.call_typed(Command::GetHostname).await
    }

    pub async fn clear_logs(&self) -> Result<(), CallError> {
        self.call_typed(Command::ClearLogs).await
    }

    pub async fn frontend_log(&self, level: &str, message: &str) -> Result<(), CallError> {
        self.call_typed(Command::FrontendLog {
            level: level.to_owned(),
            message: message.to_owned(),
        })
        .await
    }

    pub async fn subscribe(&self, topic: Topic) -> Result<Subscription, CallError> {
        self.transport.subscribe(topic).await
    }

    /// Opens one subscription per topic. On failure the ones already opened
    /// are cancelled before the error is returned.
    pub async fn subscribe_all(&self, topics: &[Topic]) -> Result<SubscriptionSet, CallError> {
        let mut set = SubscriptionSet::new();
        for topic in topics {
            set.push(self.transport.subscribe(*topic).await?);
        }
        Ok(set)
    }
}
