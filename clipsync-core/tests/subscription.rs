use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use clipsync_core::{Delivery, RawEvent, Subscription, SubscriptionSet, Topic};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

fn counted(
    topic: Topic,
    counter: &Arc<AtomicUsize>,
) -> (mpsc::UnboundedSender<Delivery>, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let counter = Arc::clone(counter);
    let stream = UnboundedReceiverStream::new(rx).boxed();
    let subscription = Subscription::new(topic, stream).on_cancel(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (tx, subscription)
}

fn event(topic: Topic, payload: serde_json::Value) -> Delivery {
    Delivery::Event(RawEvent { topic, payload })
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_runs_hook_once() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let (_tx, mut subscription) = counted(Topic::StatusUpdate, &cancelled);

    subscription.unsubscribe();
    subscription.unsubscribe();
    drop(subscription);

    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_a_subscription_cancels_it() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    {
        let (_tx, _subscription) = counted(Topic::ConfigChanged, &cancelled);
    }
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn set_merges_deliveries_and_cancels_everything() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let (status_tx, status) = counted(Topic::StatusUpdate, &cancelled);
    let (config_tx, config) = counted(Topic::ConfigChanged, &cancelled);

    let mut set = SubscriptionSet::new();
    set.push(status);
    set.push(config);
    assert_eq!(set.active_count(), 2);

    status_tx.send(event(Topic::StatusUpdate, json!("hello"))).unwrap();
    config_tx.send(Delivery::Missed(3)).unwrap();

    let mut received = vec![set.next().await.unwrap(), set.next().await.unwrap()];
    received.sort_by_key(|d| matches!(d, Delivery::Missed(_)));
    assert_eq!(received[0], event(Topic::StatusUpdate, json!("hello")));
    assert_eq!(received[1], Delivery::Missed(3));

    set.cancel_all();
    set.cancel_all();
    assert_eq!(cancelled.load(Ordering::SeqCst), 2);
    assert!(set.is_empty());
    assert!(set.next().await.is_none());
}

#[tokio::test]
async fn ended_stream_releases_its_subscription() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let (tx, mut subscription) = counted(Topic::LogEntry, &cancelled);
    drop(tx);

    assert!(subscription.next().await.is_none());
    assert!(!subscription.is_active());
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}
