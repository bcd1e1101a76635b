//! Process-global publish-subscribe event dispatcher.
//!
//! Publishing is non-blocking: a bounded FIFO queue backs the channel and a
//! full queue drops the event, incrementing a counter rather than blocking
//! the publisher. A single cooperative dispatcher task drains the queue and
//! fans each event out to matching subscribers concurrently, sorted by
//! priority (higher first), each bounded by a per-call timeout. A subscriber
//! that repeatedly errors or times out has its circuit opened for a cooldown
//! window, during which dispatch to it is skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use fakeai_core::events::{Event, EventKind};
use tokio::sync::mpsc;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);
const CIRCUIT_FAILURE_THRESHOLD: u64 = 5;
const CIRCUIT_COOLDOWN: Duration = Duration::from_secs(30);

/// Something that reacts to published events. Implementors must be
/// side-effect-free except for mutating their own tracker state, and must
/// complete within the dispatcher's timeout.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first. Accounting-critical trackers (request, error)
    /// should outrank derived ones (cost, model).
    fn priority(&self) -> i32 {
        0
    }

    /// Whether this subscriber wants events of `kind`. A subscriber
    /// interested in everything (a wildcard) should always return `true`.
    fn interested_in(&self, kind: EventKind) -> bool;

    async fn handle(&self, event: &Event) -> Result<(), String>;
}

struct SubscriberEntry {
    subscriber: Arc<dyn Subscriber>,
    consecutive_failures: AtomicU64,
    circuit_open_until: DashMap<(), Instant>,
}

impl SubscriberEntry {
    fn new(subscriber: Arc<dyn Subscriber>) -> Self {
        Self {
            subscriber,
            consecutive_failures: AtomicU64::new(0),
            circuit_open_until: DashMap::new(),
        }
    }

    fn circuit_is_open(&self, now: Instant) -> bool {
        match self.circuit_open_until.get(&()) {
            Some(until) if *until > now => true,
            Some(_) => {
                self.circuit_open_until.remove(&());
                false
            }
            None => false,
        }
    }

    fn record_outcome(&self, ok: bool) {
        if ok {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= CIRCUIT_FAILURE_THRESHOLD {
            self.circuit_open_until.insert((), Instant::now() + CIRCUIT_COOLDOWN);
        }
    }
}

/// Handle used to publish events; cheap to clone.
#[derive(Clone)]
pub struct EventBusHandle {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventBusHandle {
    /// Publishes an event without blocking. If the queue is full the event
    /// is dropped and the drop counter incremented by exactly one.
    pub fn publish(&self, event: Event) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Owns the dispatcher's subscriber list and receiving end of the queue.
pub struct EventBus {
    receiver: mpsc::Receiver<Event>,
    handle: EventBusHandle,
    subscribers: Vec<SubscriberEntry>,
    dispatch_timeout: Duration,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            receiver,
            handle: EventBusHandle { sender, dropped: Arc::new(AtomicU64::new(0)) },
            subscribers: Vec::new(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    pub fn handle(&self) -> EventBusHandle {
        self.handle.clone()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(SubscriberEntry::new(subscriber));
    }

    /// Runs the dispatch loop until the publishing side is dropped.
    /// Spawn this as a background task; it never returns early on its own.
    pub async fn run(mut self) {
        let mut order: Vec<usize> = (0..self.subscribers.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.subscribers[i].subscriber.priority()));

        while let Some(event) = self.receiver.recv().await {
            let matched: Vec<&SubscriberEntry> = order
                .iter()
                .map(|&i| &self.subscribers[i])
                .filter(|entry| entry.subscriber.interested_in(event.kind))
                .collect();

            let now = Instant::now();
            let timeout = self.dispatch_timeout;
            let dispatches = matched.iter().map(|entry| {
                let event = &event;
                async move {
                    if entry.circuit_is_open(now) {
                        return;
                    }
                    let outcome = tokio::time::timeout(timeout, entry.subscriber.handle(event)).await;
                    match outcome {
                        Ok(Ok(())) => entry.record_outcome(true),
                        Ok(Err(err)) => {
                            tracing::warn!(subscriber = entry.subscriber.name(), error = %err, "subscriber handler failed");
                            entry.record_outcome(false);
                        }
                        Err(_) => {
                            tracing::warn!(subscriber = entry.subscriber.name(), "subscriber handler timed out");
                            entry.record_outcome(false);
                        }
                    }
                }
            });
            futures::future::join_all(dispatches).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakeai_core::events::EventPayload;
    use std::sync::atomic::AtomicUsize;

    struct CountingSubscriber {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscriber for CountingSubscriber {
        fn name(&self) -> &str {
            "counting"
        }

        fn interested_in(&self, _kind: EventKind) -> bool {
            true
        }

        async fn handle(&self, _event: &Event) -> Result<(), String> {
            self.count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_to_matching_subscribers() {
        let mut bus = EventBus::new(16);
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: count.clone() }));
        let handle = bus.handle();

        let dispatcher = tokio::spawn(bus.run());
        handle.publish(Event::new(EventKind::RequestStarted, "req_1", None, EventPayload::Empty));
        // Give the dispatcher a moment to drain the single event.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(handle);
        let _ = tokio::time::timeout(Duration::from_secs(1), dispatcher).await;

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let bus = EventBus::new(1);
        let handle = bus.handle();
        handle.publish(Event::new(EventKind::RequestStarted, "a", None, EventPayload::Empty));
        handle.publish(Event::new(EventKind::RequestStarted, "b", None, EventPayload::Empty));
        handle.publish(Event::new(EventKind::RequestStarted, "c", None, EventPayload::Empty));
        assert!(handle.dropped_count() >= 1);
    }
}
