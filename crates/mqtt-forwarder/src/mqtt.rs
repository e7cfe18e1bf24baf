// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT message source.
//!
//! Drives the `rumqttc` event loop, subscribes to `{node}/#` for every node
//! on each (re)connection, and hands every publish to the router queue.
//!
//! ```text
//! broker --> EventLoop::poll --> InboundMessage --> mpsc queue --> router worker
//! ```
//!
//! Reconnection is handled here: the event loop reconnects on the next poll,
//! after an exponential backoff delay.

use crate::config::MqttConfig;
use crate::router::InboundMessage;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// MQTT source errors.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("subscription request failed: {0}")]
    Subscribe(#[from] ClientError),
}

/// Upper bound on flushing the DISCONNECT packet at shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Exponential reconnection delay: doubles after each failure, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Back to the initial delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Subscribes to the node topics and feeds the router queue.
pub struct MqttSource {
    client: AsyncClient,
    event_loop: EventLoop,
    subscriptions: Vec<String>,
    backoff: Backoff,
}

impl MqttSource {
    /// Create the client. Nothing is sent until [`run`](Self::run).
    pub fn new(config: &MqttConfig, subscriptions: Vec<String>) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let Some((user, password)) = config.credentials() {
            options.set_credentials(user, password);
        }

        // Room for one subscribe request per node plus the disconnect.
        let capacity = subscriptions.len() + 10;
        let (client, event_loop) = AsyncClient::new(options, capacity);

        Self {
            client,
            event_loop,
            subscriptions,
            backoff: Backoff::default(),
        }
    }

    /// Topic filters subscribed on every connection.
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Pump the event loop until cancelled or the queue is closed.
    pub async fn run(
        mut self,
        queue: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), MqttError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.disconnect().await;
                    return Ok(());
                }

                event = self.event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            tracing::info!("Connected with result code {:?}", ack.code);
                            self.backoff.reset();
                            self.subscribe_all()?;
                        } else {
                            tracing::error!("Connection refused by broker: {:?}", ack.code);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        tracing::trace!("Received publish on topic {}", publish.topic);
                        let msg = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if queue.send(msg).await.is_err() {
                            tracing::warn!("Router queue closed, stopping MQTT source");
                            return Ok(());
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        tracing::warn!("Disconnected by broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let delay = self.backoff.next_delay();
                        tracing::error!(
                            "MQTT connection error: {}; reconnecting in {:.1}s",
                            e,
                            delay.as_secs_f64()
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }

    /// Queue a DISCONNECT and poll until it is on the wire.
    async fn disconnect(&mut self) {
        tracing::info!("Disconnecting from MQTT broker");
        if let Err(e) = self.client.try_disconnect() {
            tracing::warn!("Error queueing disconnect packet: {}", e);
            return;
        }

        let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return true,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("Event loop stopped during disconnect: {}", e);
                        return false;
                    }
                }
            }
        })
        .await;

        match flushed {
            Ok(true) => tracing::debug!("Disconnect packet sent"),
            Ok(false) => {}
            Err(_) => tracing::warn!("Timed out sending disconnect packet"),
        }
    }

    fn subscribe_all(&self) -> Result<(), MqttError> {
        for topic in &self.subscriptions {
            tracing::info!("Subscribing to topic {}", topic);
            self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce)?;
        }
        Ok(())
    }
}
