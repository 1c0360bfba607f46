// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn subscriber_receives_in_emission_order() {
    let bus = EventBus::new();
    let sub = bus.subscribe("order", 16);
    bus.publish(Event::TargetChanged { version: 1 });
    bus.publish(Event::TargetChanged { version: 2 });
    bus.publish(Event::TargetChanged { version: 3 });

    for expected in 1..=3 {
        let event = sub.recv().await;
        assert_eq!(event, Event::TargetChanged { version: expected });
    }
}

#[tokio::test]
async fn overflow_drops_oldest_and_counts() {
    let bus = EventBus::new();
    let sub = bus.subscribe("slow", 2);
    bus.publish(Event::TargetChanged { version: 1 });
    bus.publish(Event::TargetChanged { version: 2 });
    bus.publish(Event::TargetChanged { version: 3 });

    assert_eq!(sub.dropped(), 1);
    assert_eq!(sub.recv().await, Event::TargetChanged { version: 2 });
    assert_eq!(sub.recv().await, Event::TargetChanged { version: 3 });
    assert!(sub.is_empty());
}

#[tokio::test]
async fn slow_subscriber_does_not_block_others() {
    let bus = EventBus::new();
    let slow = bus.subscribe("slow", 1);
    let fast = bus.subscribe("fast", 16);
    for version in 1..=10 {
        bus.publish(Event::TargetChanged { version });
    }
    assert_eq!(fast.len(), 10);
    assert_eq!(slow.len(), 1);
    assert_eq!(slow.dropped(), 9);
}

#[tokio::test]
async fn filter_limits_delivery() {
    let bus = EventBus::new();
    let sub = bus.subscribe_filtered("conn-only", 8, |e| {
        matches!(e, Event::ConnOnline | Event::ConnOffline { .. })
    });
    bus.publish(Event::TargetChanged { version: 1 });
    bus.publish(Event::ConnOnline);
    bus.publish(Event::CurrentChanged);

    assert_eq!(sub.recv().await, Event::ConnOnline);
    assert!(sub.is_empty());
}

#[tokio::test]
async fn dropped_subscription_is_pruned_on_publish() {
    let bus = EventBus::new();
    let keep = bus.subscribe("keep", 4);
    {
        let _gone = bus.subscribe("gone", 4);
    }
    bus.publish(Event::ConnOnline);
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(keep.recv().await, Event::ConnOnline);
}

#[tokio::test]
async fn recv_wakes_on_later_publish() {
    let bus = EventBus::new();
    let sub = bus.subscribe("waiter", 4);
    let publisher = bus.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.publish(Event::Shutdown);
    });
    let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .unwrap();
    assert_eq!(event, Event::Shutdown);
    handle.await.unwrap();
}
