//! Supervised event stream consumer
//!
//! One iteration is one connection attempt:
//!
//! 1. open the feed; on failure mark the stream disconnected and return
//! 2. mark the stream connected and scan lines until end of stream or error
//! 3. publish every line matching a known signature, logging publish failures
//! 4. mark the stream disconnected and return
//!
//! The supervisor runs iterations back to back with a fixed cooldown in between
//! and checks the shutdown signal only between iterations.

use super::{EventBody, EventSource, LineScanner, Sleeper, StreamError};
use crate::protocol::match_signature;
use crate::state::ConnectionFlags;
use crate::transport::EventPublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Default wait after each attempt
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(5);

/// How an iteration ended
#[derive(Debug)]
pub enum IterationOutcome {
    /// The feed could not be opened (network error or non-200)
    ConnectFailed(StreamError),
    /// The device closed the stream
    Ended,
    /// Reading or scanning the stream failed
    ReadFailed(StreamError),
}

/// Result of a single connection attempt
#[derive(Debug)]
pub struct IterationReport {
    pub outcome: IterationOutcome,
    /// Lines that matched a signature
    pub events_detected: u64,
    /// Publishes that returned an error
    pub publish_failures: u64,
}

/// Totals over the supervisor's lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSummary {
    pub iterations: u64,
    pub events_detected: u64,
    pub publish_failures: u64,
}

/// Connect/scan/cooldown loop over an [`EventSource`]
pub struct StreamConsumer<S: EventSource> {
    source: Arc<S>,
    publisher: Arc<dyn EventPublisher>,
    flags: Arc<ConnectionFlags>,
    sleeper: Arc<dyn Sleeper>,
    cooldown: Duration,
}

impl<S: EventSource> StreamConsumer<S> {
    pub fn new(
        source: Arc<S>,
        publisher: Arc<dyn EventPublisher>,
        flags: Arc<ConnectionFlags>,
        sleeper: Arc<dyn Sleeper>,
        cooldown: Duration,
    ) -> Self {
        Self {
            source,
            publisher,
            flags,
            sleeper,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Run iterations until the shutdown signal turns `true` or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SupervisorSummary {
        let mut summary = SupervisorSummary::default();
        info!(
            cooldown_secs = self.cooldown.as_secs_f64(),
            "Event stream supervisor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_once().await;
            summary.iterations += 1;
            summary.events_detected += report.events_detected;
            summary.publish_failures += report.publish_failures;
            Self::log_report(&report);

            if !self.cool_down(&mut shutdown).await {
                break;
            }
        }

        self.flags.set_stream_connected(false);
        info!(
            iterations = summary.iterations,
            events = summary.events_detected,
            "Event stream supervisor stopped"
        );
        summary
    }

    /// One connection attempt, without the trailing cooldown
    pub async fn run_once(&self) -> IterationReport {
        let mut body = match self.source.open().await {
            Ok(body) => body,
            Err(e) => {
                self.flags.set_stream_connected(false);
                return IterationReport {
                    outcome: IterationOutcome::ConnectFailed(e),
                    events_detected: 0,
                    publish_failures: 0,
                };
            }
        };

        self.flags.set_stream_connected(true);
        info!("Connected to event stream and listening for events");

        let mut scanner = LineScanner::new();
        let mut events_detected = 0;
        let mut publish_failures = 0;

        let outcome = 'read: loop {
            match body.next_chunk().await {
                Ok(Some(chunk)) => {
                    scanner.push(&chunk);
                    loop {
                        match scanner.next_line() {
                            Ok(Some(line)) => {
                                self.handle_line(&line, &mut events_detected, &mut publish_failures)
                                    .await;
                            }
                            Ok(None) => break,
                            Err(e) => break 'read IterationOutcome::ReadFailed(e),
                        }
                    }
                }
                Ok(None) => {
                    if let Some(line) = scanner.finish() {
                        self.handle_line(&line, &mut events_detected, &mut publish_failures)
                            .await;
                    }
                    break IterationOutcome::Ended;
                }
                Err(e) => break IterationOutcome::ReadFailed(e),
            }
        };

        drop(body);
        self.flags.set_stream_connected(false);

        IterationReport {
            outcome,
            events_detected,
            publish_failures,
        }
    }

    async fn handle_line(&self, line: &[u8], events: &mut u64, failures: &mut u64) {
        let Some(signature) = match_signature(line) else {
            return;
        };

        *events += 1;
        info!(event = %signature.kind, signature = signature.name, "Doorbell pressed");

        // A lost notification must never tear down the stream
        if let Err(e) = self.publisher.publish_event(signature.kind).await {
            *failures += 1;
            warn!(event = %signature.kind, error = %e, "Failed to publish event");
        }
    }

    /// Wait out the cooldown. Returns `false` when shutdown was requested.
    async fn cool_down(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        debug!(
            cooldown_secs = self.cooldown.as_secs_f64(),
            "Waiting before next event stream attempt"
        );
        tokio::select! {
            _ = self.sleeper.sleep(self.cooldown) => !*shutdown.borrow(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Shutdown requested during cooldown");
                    return false;
                }
                true
            }
        }
    }

    fn log_report(report: &IterationReport) {
        match &report.outcome {
            IterationOutcome::ConnectFailed(StreamError::Status(status)) => {
                error!(status = *status, "Received non-OK HTTP status from event stream");
            }
            IterationOutcome::ConnectFailed(e) => {
                error!(error = %e, "Error fetching event stream");
            }
            IterationOutcome::Ended => {
                warn!(
                    events = report.events_detected,
                    "Event stream ended by device"
                );
            }
            IterationOutcome::ReadFailed(e) => {
                error!(
                    error = %e,
                    events = report.events_detected,
                    "Error reading the event stream"
                );
            }
        }
    }
}
