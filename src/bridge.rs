//! Bridge lifecycle
//!
//! Wires the device client, the MQTT gateway, the health server and the stream
//! supervisor together and tears them down in order:
//!
//! ```text
//! Starting -> Running -> ShuttingDown -> Stopped
//! ```
//!
//! Startup failures (bad device host, broker unreachable, health port taken) are
//! fatal. Once running, only the shutdown future ends the bridge.

use crate::config::BridgeConfig;
use crate::device::DeviceClient;
use crate::error::BridgeResult;
use crate::observability::health::{HealthServer, PresenceProbe};
use crate::state::ConnectionFlags;
use crate::stream::{StreamConsumer, SupervisorSummary, TokioSleeper};
use crate::transport::mqtt::MqttGateway;
use crate::transport::EventPublisher;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

/// Extra time the supervisor gets on top of its cooldown before it is aborted
const SUPERVISOR_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle phase of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for BridgePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgePhase::Starting => "starting",
            BridgePhase::Running => "running",
            BridgePhase::ShuttingDown => "shutting_down",
            BridgePhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The doorbell-to-MQTT bridge
pub struct Bridge {
    config: BridgeConfig,
    flags: Arc<ConnectionFlags>,
    phase_tx: watch::Sender<BridgePhase>,
    health_addr: Mutex<Option<SocketAddr>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let (phase_tx, _) = watch::channel(BridgePhase::Starting);
        Self {
            config,
            flags: ConnectionFlags::shared(),
            phase_tx,
            health_addr: Mutex::new(None),
        }
    }

    pub fn flags(&self) -> Arc<ConnectionFlags> {
        self.flags.clone()
    }

    pub fn phase(&self) -> BridgePhase {
        *self.phase_tx.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<BridgePhase> {
        self.phase_tx.subscribe()
    }

    /// Address the health server is bound to, once running
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health_addr.lock().ok().and_then(|addr| *addr)
    }

    fn transition(&self, phase: BridgePhase) {
        let previous = self.phase_tx.send_replace(phase);
        info!(from = %previous, to = %phase, "Bridge phase changed");
    }

    /// Start every component, run until `shutdown` completes, then tear down
    pub async fn run<F>(&self, shutdown: F) -> BridgeResult<SupervisorSummary>
    where
        F: Future<Output = ()>,
    {
        let span = crate::lifecycle_span!(device = %self.config.device.host);
        self.run_phases(shutdown).instrument(span).await
    }

    async fn run_phases<F>(&self, shutdown: F) -> BridgeResult<SupervisorSummary>
    where
        F: Future<Output = ()>,
    {
        let config = &self.config;

        let device = match DeviceClient::new(&config.device, config.stream.heartbeat_secs) {
            Ok(device) => Arc::new(device),
            Err(e) => {
                self.transition(BridgePhase::Stopped);
                return Err(e.into());
            }
        };

        let gateway = match MqttGateway::connect(&config.mqtt, self.flags.clone()).await {
            Ok(gateway) => Arc::new(gateway),
            Err(e) => {
                self.transition(BridgePhase::Stopped);
                return Err(e.into());
            }
        };
        let disconnect_grace = Duration::from_millis(config.mqtt.disconnect_grace_ms);

        let probe: Arc<dyn PresenceProbe> = device.clone();
        let health = Arc::new(HealthServer::new(
            config.health.port,
            self.flags.clone(),
            probe,
        ));
        let health_handle = match health.start() {
            Ok(handle) => handle,
            Err(e) => {
                gateway.disconnect(disconnect_grace).await;
                self.transition(BridgePhase::Stopped);
                return Err(e.into());
            }
        };
        if let Ok(mut addr) = self.health_addr.lock() {
            *addr = Some(health_handle.local_addr());
        }

        let cooldown = Duration::from_secs(config.stream.retry_cooldown_secs);
        let publisher: Arc<dyn EventPublisher> = gateway.clone();
        let consumer = StreamConsumer::new(
            device,
            publisher,
            self.flags.clone(),
            Arc::new(TokioSleeper),
            cooldown,
        );
        let supervisor_wait = consumer.cooldown() + SUPERVISOR_GRACE;
        let (supervisor_tx, supervisor_rx) = watch::channel(false);
        let mut supervisor = tokio::spawn(
            async move { consumer.run(supervisor_rx).await }
                .instrument(crate::stream_span!(cooldown_secs = cooldown.as_secs())),
        );

        self.transition(BridgePhase::Running);
        shutdown.await;
        self.transition(BridgePhase::ShuttingDown);

        gateway.disconnect(disconnect_grace).await;

        let _ = supervisor_tx.send(true);

        health_handle
            .shutdown(Duration::from_secs(config.health.shutdown_grace_secs))
            .await;

        let summary = match tokio::time::timeout(supervisor_wait, &mut supervisor).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                error!(error = %e, "Event stream supervisor failed");
                SupervisorSummary::default()
            }
            Err(_) => {
                warn!(
                    wait_secs = supervisor_wait.as_secs_f64(),
                    "Event stream supervisor still reading, aborting"
                );
                supervisor.abort();
                self.flags.set_stream_connected(false);
                SupervisorSummary::default()
            }
        };

        self.transition(BridgePhase::Stopped);
        info!(
            iterations = summary.iterations,
            events = summary.events_detected,
            publish_failures = summary.publish_failures,
            "Bridge stopped"
        );
        Ok(summary)
    }
}
