//! Impure I/O operations for the MQTT gateway
//!
//! Owns the rumqttc client and the task that polls its event loop. The task is
//! the only writer of the bus flag in [`ConnectionFlags`].

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::protocol::EventKind;
use crate::state::ConnectionFlags;
use crate::transport::{EventPublisher, PublishError};
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// How long `connect` waits for the first ConnAck
pub const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Publishes doorbell events to the MQTT broker
pub struct MqttGateway {
    client: AsyncClient,
    flags: Arc<ConnectionFlags>,
    state_rx: watch::Receiver<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    publish_timeout: Duration,
}

impl MqttGateway {
    /// Connect to the broker and wait for the first ConnAck
    ///
    /// Any failure before the ConnAck is returned as an error; the background
    /// task is stopped in that case.
    pub async fn connect(
        config: &MqttSection,
        flags: Arc<ConnectionFlags>,
    ) -> Result<Self, MqttError> {
        Self::connect_with_timeout(config, flags, CONNACK_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        config: &MqttSection,
        flags: Arc<ConnectionFlags>,
        connack_timeout: Duration,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(broker = %config.broker_url, client_id = %config.client_id, "Connecting to MQTT broker");

        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            flags.clone(),
            state_tx.clone(),
            shutdown_rx,
            ReconnectConfig::default(),
        ));

        let confirmation = Self::wait_for_connection_confirmation(state_rx.clone(), connack_timeout)
            .instrument(crate::mqtt_span!(
                operation = "connect",
                client_id = %config.client_id
            ));
        if let Err(e) = confirmation.await {
            let _ = shutdown_tx.send(true);
            handle.abort();
            flags.set_bus_connected(false);
            return Err(e);
        }

        info!(broker = %config.broker_url, "Connected to MQTT broker");

        Ok(Self {
            client,
            flags,
            state_rx,
            state_tx,
            shutdown_tx,
            event_loop_handle: Mutex::new(Some(handle)),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        })
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "State channel closed".to_string(),
                    ));
                }
                let state = state_rx.borrow().clone();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailed(reason));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailed(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Poll the rumqttc event loop until our own DISCONNECT goes out or
    /// shutdown is signalled during a backoff delay
    async fn run_event_loop(
        mut event_loop: EventLoop,
        flags: Arc<ConnectionFlags>,
        state_tx: watch::Sender<ConnectionState>,
        shutdown_rx: watch::Receiver<bool>,
        reconnect_config: ReconnectConfig,
    ) {
        let mut reconnect_attempts = 0u32;

        loop {
            match event_loop.poll().await {
                Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged => {
                        if reconnect_attempts > 0 {
                            info!(attempts = reconnect_attempts, "Reconnected to MQTT broker");
                        }
                        reconnect_attempts = 0;
                        flags.set_bus_connected(true);
                        let _ = state_tx.send(ConnectionState::Connected);
                    }
                    EventRoute::Disconnected(reason) => {
                        warn!(reason = %reason, "MQTT broker sent disconnect");
                        flags.set_bus_connected(false);
                        let _ = state_tx.send(ConnectionState::Disconnected(reason));
                        reconnect_attempts += 1;
                        if !Self::backoff(&reconnect_config, reconnect_attempts, &shutdown_rx).await
                        {
                            break;
                        }
                    }
                    EventRoute::DisconnectSent => {
                        debug!(target: "mqtt_transport", "DISCONNECT flushed, stopping event loop");
                        break;
                    }
                    EventRoute::InfrastructureEvent(event_str) => {
                        debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                    }
                    EventRoute::OutgoingEvent => {}
                },
                Err(e) => {
                    if flags.set_bus_connected(false) {
                        error!(error = %e, "MQTT connection lost");
                    } else {
                        debug!(target: "mqtt_transport", error = %e, "MQTT connection attempt failed");
                    }
                    let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                    reconnect_attempts = reconnect_attempts.saturating_add(1);
                    if !Self::backoff(&reconnect_config, reconnect_attempts, &shutdown_rx).await {
                        break;
                    }
                }
            }
        }

        flags.set_bus_connected(false);
        info!("MQTT event loop stopped");
    }

    async fn backoff(
        reconnect_config: &ReconnectConfig,
        attempt: u32,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> bool {
        let delay_ms = reconnect_config.calculate_backoff_delay(attempt);
        debug!(target: "mqtt_transport", attempt, delay_ms, "Retrying MQTT connection");
        Self::interruptible_sleep(shutdown_rx.clone(), delay_ms).await
    }

    /// Perform interruptible sleep with shutdown monitoring
    /// Returns true if sleep completed, false if shutdown requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        if *shutdown_rx.borrow() {
            return false;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    /// Current connection state as seen by the event loop task
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Send DISCONNECT and give the event loop `grace` to flush it
    ///
    /// The event loop task is aborted if it is still running afterwards. The bus
    /// flag is `false` when this returns. Calling it twice is harmless.
    pub async fn disconnect(&self, grace: Duration) {
        let Some(mut handle) = self.event_loop_handle.lock().await.take() else {
            debug!(target: "mqtt_transport", "MQTT gateway already disconnected");
            return;
        };

        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "Failed to queue MQTT disconnect");
        }

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => info!("MQTT event loop shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!(error = %e, "MQTT event loop ended with error"),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "MQTT event loop did not stop in time, aborting"
                );
                let _ = self.shutdown_tx.send(true);
                handle.abort();
            }
        }

        self.flags.set_bus_connected(false);
        let _ = self
            .state_tx
            .send(ConnectionState::Disconnected("Client disconnected".to_string()));
        info!("Disconnected from MQTT broker");
    }
}

#[async_trait]
impl EventPublisher for MqttGateway {
    async fn publish_event(&self, kind: EventKind) -> Result<(), PublishError> {
        if !self.flags.bus_connected() {
            return Err(PublishError::NotConnected);
        }

        let topic = kind.topic();
        let publish = self
            .client
            .publish(topic, QoS::AtMostOnce, false, Vec::<u8>::new());

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {
                info!(topic, event = %kind, "Queued event for publishing");
                Ok(())
            }
            Ok(Err(e)) => Err(PublishError::Rejected(Box::new(e))),
            Err(_) => Err(PublishError::Timeout(self.publish_timeout)),
        }
    }
}

impl Drop for MqttGateway {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.event_loop_handle.get_mut().take() {
            handle.abort();
        }
    }
}
