// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process typed pub/sub between components.
//!
//! Every subscriber owns a bounded queue; a slow subscriber loses its own
//! oldest events (counted and logged) without ever blocking the publisher
//! or its peers. Events are observed in emission order per subscriber.

use crate::event::Event;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

type EventFilter = Box<dyn Fn(&Event) -> bool + Send + Sync>;

/// Bus handle; clones share the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subs: Arc<Mutex<Vec<Arc<SubShared>>>>,
}

struct SubShared {
    name: String,
    capacity: usize,
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
    filter: Option<EventFilter>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all events with a bounded buffer.
    pub fn subscribe(&self, name: impl Into<String>, capacity: usize) -> Subscription {
        self.attach(name.into(), capacity, None)
    }

    /// Subscribe to the events the filter accepts.
    pub fn subscribe_filtered(
        &self,
        name: impl Into<String>,
        capacity: usize,
        filter: impl Fn(&Event) -> bool + Send + Sync + 'static,
    ) -> Subscription {
        self.attach(name.into(), capacity, Some(Box::new(filter)))
    }

    fn attach(&self, name: String, capacity: usize, filter: Option<EventFilter>) -> Subscription {
        let shared = Arc::new(SubShared {
            name,
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            filter,
        });
        self.subs.lock().push(shared.clone());
        Subscription { shared }
    }

    /// Deliver an event to every live subscriber, dropping each
    /// subscriber's oldest entry on overflow.
    pub fn publish(&self, event: Event) {
        tracing::debug!("event {}", event.log_summary());
        let mut subs = self.subs.lock();
        subs.retain(|s| !s.closed.load(Ordering::Relaxed));
        for sub in subs.iter() {
            if let Some(filter) = &sub.filter {
                if !filter(&event) {
                    continue;
                }
            }
            {
                let mut queue = sub.queue.lock();
                if queue.len() >= sub.capacity {
                    queue.pop_front();
                    let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber = %sub.name,
                        dropped,
                        "subscriber buffer full, dropped oldest event"
                    );
                }
                queue.push_back(event.clone());
            }
            sub.notify.notify_one();
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subs.lock();
        subs.retain(|s| !s.closed.load(Ordering::Relaxed));
        subs.len()
    }
}

/// One subscriber's end of the bus.
pub struct Subscription {
    shared: Arc<SubShared>,
}

impl Subscription {
    /// Wait for the next event. Drains buffered events before sleeping.
    pub async fn recv(&self) -> Event {
        loop {
            if let Some(event) = self.shared.queue.lock().pop_front() {
                return event;
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.shared.queue.lock().pop_front()
    }

    /// Events this subscriber lost to overflow.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.lock().is_empty()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
