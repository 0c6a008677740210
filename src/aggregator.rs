//! Event aggregation across connectors
//!
//! Each connector writes into its own bounded queue; the aggregator drains
//! all queues with fair round-robin interleaving. A full queue drops its
//! oldest pending event rather than blocking the connector's network loop —
//! chat is a best-effort, latest-message-priority stream.
//!
//! Ordering: events from a single connector are forwarded in arrival order.
//! No cross-connector ordering is guaranteed; the platforms are independent
//! clocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::event::{ChatEvent, Platform};

/// One connector's bounded pending-event queue
#[derive(Debug)]
struct SourceQueue {
    platform: Platform,
    pending: Mutex<VecDeque<ChatEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl SourceQueue {
    /// Append an event, evicting the oldest pending one when full
    fn push(&self, event: ChatEvent) {
        let mut pending = self.pending.lock().expect("source queue poisoned");
        if pending.len() >= self.capacity {
            pending.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        pending.push_back(event);
    }

    fn pop(&self) -> Option<ChatEvent> {
        self.pending.lock().expect("source queue poisoned").pop_front()
    }
}

/// Write handle given to a connector.
///
/// `push` never blocks and never fails; overflow is resolved by dropping
/// the connector's oldest pending event.
#[derive(Clone)]
pub struct SourceSink {
    queue: Arc<SourceQueue>,
    notify: Arc<Notify>,
}

impl SourceSink {
    /// Deliver one event into this connector's queue
    pub fn push(&self, event: ChatEvent) {
        self.queue.push(event);
        self.notify.notify_one();
    }

    /// Platform this sink belongs to
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.queue.platform
    }
}

/// Merges N connector queues into one consumer-facing sequence
pub struct Aggregator {
    sources: Vec<Arc<SourceQueue>>,
    notify: Arc<Notify>,
    cursor: usize,
}

impl Aggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            notify: Arc::new(Notify::new()),
            cursor: 0,
        }
    }

    /// Register a source and obtain its write handle.
    ///
    /// Must be called before draining begins; one sink per connector.
    pub fn register(&mut self, platform: Platform, capacity: usize) -> SourceSink {
        let queue = Arc::new(SourceQueue {
            platform,
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        });
        self.sources.push(Arc::clone(&queue));
        SourceSink {
            queue,
            notify: Arc::clone(&self.notify),
        }
    }

    /// Pop the next event without waiting.
    ///
    /// Round-robins across currently non-empty queues starting after the
    /// last-served source, so one busy connector cannot starve the others.
    pub fn try_next(&mut self) -> Option<ChatEvent> {
        let n = self.sources.len();
        for offset in 0..n {
            let i = (self.cursor + offset) % n;
            if let Some(event) = self.sources[i].pop() {
                self.cursor = (i + 1) % n;
                return Some(event);
            }
        }
        None
    }

    /// Wait for and pop the next event.
    ///
    /// Suspends while all source queues are empty.
    pub async fn next(&mut self) -> ChatEvent {
        loop {
            let notify = Arc::clone(&self.notify);
            let notified = notify.notified();
            if let Some(event) = self.try_next() {
                return event;
            }
            notified.await;
        }
    }

    /// Total events dropped to overflow, summed across sources
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.sources
            .iter()
            .map(|s| s.dropped.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
