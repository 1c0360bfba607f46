// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared broker connection.
//!
//! One MQTT connection per process. The event loop runs as an owned task:
//! it re-establishes the session with exponential backoff and replays all
//! active subscriptions on every reconnect. Message handlers run on the
//! dispatch task and must stay short; hand real work to the event bus.

use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectionError, Event, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// QoS levels, decoupled from the MQTT crate so fakes and the engine
/// never import it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// A message delivered to a subscription handler.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Subscription callback. Runs on the broker dispatch task.
pub type MessageHandler = Arc<dyn Fn(IncomingMessage) + Send + Sync>;

/// The pub/sub surface components depend on.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError>;

    /// Register a handler and subscribe. The subscription is replayed
    /// automatically after every reconnect.
    async fn subscribe(
        &self,
        topic: &str,
        qos: Qos,
        handler: MessageHandler,
    ) -> Result<(), TransportError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

// Shared handles pass straight through, so wiring code can hold an
// `Arc<dyn Broker>` where components are generic over `B: Broker`.
#[async_trait]
impl<T: Broker + ?Sized> Broker for Arc<T> {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError> {
        (**self).publish(topic, payload, qos, retain).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: Qos,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        (**self).subscribe(topic, qos, handler).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        (**self).unsubscribe(topic).await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        (**self).disconnect().await
    }
}

/// Connection parameters for the broker session.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// `mqtt://host:port` (or bare `host:port`).
    pub url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// Reconnect backoff cap.
    pub max_reconnect_backoff: Duration,
}

impl BrokerConfig {
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            max_reconnect_backoff: Duration::from_secs(60),
        }
    }
}

/// Split `mqtt://host:port` into host and port (default 1883).
fn parse_broker_url(url: &str) -> Result<(String, u16), TransportError> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);
    let (host, port) = match stripped.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| TransportError::InvalidEndpoint(url.to_string()))?;
            (host, port)
        }
        None => (stripped, 1883),
    };
    if host.is_empty() {
        return Err(TransportError::InvalidEndpoint(url.to_string()));
    }
    Ok((host.to_string(), port))
}

struct BrokerShared {
    connected: AtomicBool,
    subscriptions: Mutex<HashMap<String, (Qos, MessageHandler)>>,
}

/// rumqttc-backed [`Broker`].
#[derive(Clone)]
pub struct MqttBroker {
    client: AsyncClient,
    shared: Arc<BrokerShared>,
}

impl MqttBroker {
    /// Establish the session and spawn the dispatch task. The task exits
    /// when `cancel` fires.
    pub fn connect(
        config: BrokerConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), TransportError> {
        let (host, port) = parse_broker_url(&config.url)?;
        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, event_loop) = AsyncClient::new(options, 64);
        let shared = Arc::new(BrokerShared {
            connected: AtomicBool::new(false),
            subscriptions: Mutex::new(HashMap::new()),
        });

        let broker = Self {
            client: client.clone(),
            shared: shared.clone(),
        };
        let handle = tokio::spawn(run_event_loop(
            event_loop,
            client,
            shared,
            cancel,
            config.max_reconnect_backoff,
        ));
        Ok((broker, handle))
    }
}

async fn run_event_loop(
    mut event_loop: rumqttc::EventLoop,
    client: AsyncClient,
    shared: Arc<BrokerShared>,
    cancel: CancellationToken,
    max_backoff: Duration,
) {
    let mut backoff = INITIAL_RECONNECT_BACKOFF;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                shared.connected.store(true, Ordering::Relaxed);
                backoff = INITIAL_RECONNECT_BACKOFF;
                tracing::info!("broker connected");
                resubscribe_all(&client, &shared).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let handler = {
                    let subs = shared.subscriptions.lock();
                    subs.get(&publish.topic).map(|(_, h)| h.clone())
                };
                match handler {
                    Some(handler) => handler(IncomingMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    }),
                    None => {
                        tracing::debug!(topic = %publish.topic, "no handler for incoming publish")
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                shared.connected.store(false, Ordering::Relaxed);
                tracing::info!("broker sent disconnect");
            }
            Ok(_) => {}
            Err(err) => {
                let was_connected = shared.connected.swap(false, Ordering::Relaxed);
                if was_connected {
                    tracing::warn!(error = %err, "broker connection lost");
                } else {
                    tracing::debug!(error = %err, "broker reconnect attempt failed");
                }
                if matches!(err, ConnectionError::RequestsDone) {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
    shared.connected.store(false, Ordering::Relaxed);
    tracing::debug!("broker dispatch task exited");
}

/// Replay every registered subscription after a reconnect.
async fn resubscribe_all(client: &AsyncClient, shared: &BrokerShared) {
    let topics: Vec<(String, Qos)> = {
        let subs = shared.subscriptions.lock();
        subs.iter().map(|(t, (q, _))| (t.clone(), *q)).collect()
    };
    for (topic, qos) in topics {
        if let Err(err) = client.subscribe(&topic, qos.into()).await {
            tracing::warn!(topic = %topic, error = %err, "resubscribe failed");
        }
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let send = self.client.publish(topic, qos.into(), retain, payload);
        match tokio::time::timeout(PUBLISH_TIMEOUT, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::NotConnected),
            Err(_) => Err(TransportError::PublishTimeout),
        }
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: Qos,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        // Register before subscribing so a racing reconnect replays it.
        self.shared
            .subscriptions
            .lock()
            .insert(topic.to_string(), (qos, handler));
        if self.is_connected() {
            self.client
                .subscribe(topic, qos.into())
                .await
                .map_err(|_| TransportError::SubscribeDenied(topic.to_string()))?;
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.shared.subscriptions.lock().remove(topic);
        if self.is_connected() {
            self.client
                .unsubscribe(topic)
                .await
                .map_err(|_| TransportError::NotConnected)?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.shared.connected.store(false, Ordering::Relaxed);
        self.client
            .disconnect()
            .await
            .map_err(|_| TransportError::NotConnected)
    }
}

/// Stand-in for fleets provisioned without a broker. Never connected;
/// publishing fails so callers fall back to HTTP.
#[derive(Default, Clone)]
pub struct NoBroker;

#[async_trait]
impl Broker for NoBroker {
    async fn publish(
        &self,
        _topic: &str,
        _payload: Vec<u8>,
        _qos: Qos,
        _retain: bool,
    ) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn subscribe(
        &self,
        topic: &str,
        _qos: Qos,
        _handler: MessageHandler,
    ) -> Result<(), TransportError> {
        tracing::debug!(topic, "no broker configured, subscription ignored");
        Ok(())
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
