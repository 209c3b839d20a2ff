//! Health check HTTP server
//!
//! `/health` answers `200` with an empty body when the bus and the event stream
//! are both connected and the doorbell accepts the online announcement. Any other
//! combination answers `503` with a one-line plaintext summary, e.g.
//!
//! ```text
//! MQTT: connected, HTTP: disconnected, Doorbell: HTTP Status Error 401 Unauthorized
//! ```
//!
//! Every request runs the probe once, so each check is also a presence
//! announcement to the device.

use crate::state::ConnectionFlags;
use async_trait::async_trait;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};
use warp::http::StatusCode;
use warp::Filter;

/// Failure of the online announcement
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The request never produced a response
    #[error("probe request failed: {0}")]
    Request(String),
    /// The device answered with a non-200 status, e.g. `401 Unauthorized`
    #[error("probe returned status {0}")]
    Status(String),
}

/// Tells the doorbell the bridge is online
#[async_trait]
pub trait PresenceProbe: Send + Sync {
    async fn announce_online(&self) -> Result<(), ProbeError>;
}

#[derive(Debug, Error)]
pub enum HealthServerError {
    #[error("Failed to bind health server on port {port}")]
    Bind {
        port: u16,
        #[source]
        source: warp::Error,
    },
}

/// Doorbell part of a health report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoorbellStatus {
    Okay,
    RequestError,
    StatusError(String),
}

impl From<&Result<(), ProbeError>> for DoorbellStatus {
    fn from(result: &Result<(), ProbeError>) -> Self {
        match result {
            Ok(()) => DoorbellStatus::Okay,
            Err(ProbeError::Request(_)) => DoorbellStatus::RequestError,
            Err(ProbeError::Status(status)) => DoorbellStatus::StatusError(status.clone()),
        }
    }
}

impl fmt::Display for DoorbellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorbellStatus::Okay => f.write_str("okay"),
            DoorbellStatus::RequestError => f.write_str("HTTP Request Error"),
            DoorbellStatus::StatusError(status) => write!(f, "HTTP Status Error {status}"),
        }
    }
}

/// Result of one health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub bus_connected: bool,
    pub stream_connected: bool,
    pub doorbell: DoorbellStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.bus_connected && self.stream_connected && self.doorbell == DoorbellStatus::Okay
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }

    /// Response body: empty when healthy, the summary line otherwise
    pub fn body(&self) -> String {
        if self.is_healthy() {
            String::new()
        } else {
            self.to_string()
        }
    }
}

fn connectivity(connected: bool) -> &'static str {
    if connected {
        "connected"
    } else {
        "disconnected"
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MQTT: {}, HTTP: {}, Doorbell: {}",
            connectivity(self.bus_connected),
            connectivity(self.stream_connected),
            self.doorbell
        )
    }
}

/// HTTP health check server
pub struct HealthServer {
    port: u16,
    flags: Arc<ConnectionFlags>,
    probe: Arc<dyn PresenceProbe>,
}

impl HealthServer {
    pub fn new(port: u16, flags: Arc<ConnectionFlags>, probe: Arc<dyn PresenceProbe>) -> Self {
        Self { port, flags, probe }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Snapshot the flags and run the probe once
    pub async fn check(&self) -> HealthReport {
        let snapshot = self.flags.snapshot();
        let probe_result = self.probe.announce_online().await;

        match &probe_result {
            Ok(()) => {}
            Err(ProbeError::Request(e)) => error!(error = %e, "Doorbell online announcement failed"),
            Err(ProbeError::Status(status)) => {
                error!(status = %status, "Doorbell rejected online announcement")
            }
        }

        HealthReport {
            bus_connected: snapshot.bus_connected,
            stream_connected: snapshot.stream_connected,
            doorbell: DoorbellStatus::from(&probe_result),
        }
    }

    /// `/health` route; any method is accepted, other paths fall through to 404
    pub fn routes(
        self: &Arc<Self>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let server = self.clone();
        warp::path("health").and(warp::path::end()).and_then(move || {
            let server = server.clone();
            async move {
                let report = server
                    .check()
                    .instrument(crate::health_span!(port = server.port))
                    .await;
                if !report.is_healthy() {
                    warn!(report = %report, "Health check failed");
                }
                Ok::<_, Infallible>(warp::reply::with_status(
                    report.body(),
                    report.status_code(),
                ))
            }
        })
    }

    /// Bind on all interfaces and serve in a background task
    pub fn start(self: Arc<Self>) -> Result<HealthServerHandle, HealthServerError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let routes = self.routes();

        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], self.port), async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|source| HealthServerError::Bind {
                port: self.port,
                source,
            })?;

        info!(address = %local_addr, "Health server listening");
        let task = tokio::spawn(server);

        Ok(HealthServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

/// Running health server
pub struct HealthServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HealthServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait up to `grace` for in-flight
    /// requests; the server task is aborted after that
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => info!("Health server stopped"),
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs_f64(),
                    "Health server did not drain in time, aborting"
                );
                self.task.abort();
            }
        }
    }
}
