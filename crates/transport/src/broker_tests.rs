// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    scheme_and_port = { "mqtt://broker.local:8883", "broker.local", 8883 },
    tcp_scheme = { "tcp://10.0.0.2:1883", "10.0.0.2", 1883 },
    bare_host_port = { "broker.local:1884", "broker.local", 1884 },
    default_port = { "mqtt://broker.local", "broker.local", 1883 },
)]
fn broker_url_parses(url: &str, host: &str, port: u16) {
    assert_eq!(parse_broker_url(url).unwrap(), (host.to_string(), port));
}

#[parameterized(
    empty = { "" },
    scheme_only = { "mqtt://" },
    bad_port = { "mqtt://broker.local:notaport" },
)]
fn broker_url_rejects(url: &str) {
    assert!(matches!(
        parse_broker_url(url),
        Err(TransportError::InvalidEndpoint(_))
    ));
}

#[test]
fn qos_maps_to_mqtt_levels() {
    assert_eq!(QoS::from(Qos::AtMostOnce), QoS::AtMostOnce);
    assert_eq!(QoS::from(Qos::AtLeastOnce), QoS::AtLeastOnce);
    assert_eq!(QoS::from(Qos::ExactlyOnce), QoS::ExactlyOnce);
}

#[tokio::test]
async fn no_broker_is_never_connected() {
    let broker = NoBroker;
    assert!(!broker.is_connected());
    assert!(matches!(
        broker.publish("t", vec![], Qos::AtLeastOnce, false).await,
        Err(TransportError::NotConnected)
    ));
    // Subscriptions are accepted and silently ignored
    broker
        .subscribe("t", Qos::AtLeastOnce, Arc::new(|_| {}))
        .await
        .unwrap();
    broker.unsubscribe("t").await.unwrap();
    broker.disconnect().await.unwrap();
}

#[tokio::test]
async fn mqtt_broker_starts_disconnected_and_queues_subscriptions() {
    let cancel = CancellationToken::new();
    let (broker, handle) = MqttBroker::connect(
        BrokerConfig::new("mqtt://127.0.0.1:18830", "device_test"),
        cancel.clone(),
    )
    .unwrap();

    assert!(!broker.is_connected());
    // Not connected: publish refused, subscribe registered for replay
    assert!(matches!(
        broker.publish("t", vec![1], Qos::AtLeastOnce, false).await,
        Err(TransportError::NotConnected)
    ));
    broker
        .subscribe("t", Qos::AtLeastOnce, Arc::new(|_| {}))
        .await
        .unwrap();
    assert_eq!(broker.shared.subscriptions.lock().len(), 1);

    cancel.cancel();
    let _ = handle.await;
}
