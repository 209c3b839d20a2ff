//! Mock implementations for testing
//!
//! Scripted event sources, a recording publisher, a recording sleeper and a
//! canned presence probe, so the consumer and the health server can be tested
//! without a doorbell or a broker.

use crate::observability::health::{PresenceProbe, ProbeError};
use crate::protocol::EventKind;
use crate::stream::{EventBody, EventSource, Sleeper, StreamError};
use crate::transport::{EventPublisher, PublishError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock publisher recording every published event
#[derive(Debug, Default)]
pub struct MockPublisher {
    pub published: Arc<Mutex<Vec<EventKind>>>,
    attempts: AtomicUsize,
    pub should_fail: bool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish fails with [`PublishError::Rejected`]
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn published(&self) -> Vec<EventKind> {
        self.published.lock().await.clone()
    }

    /// Publish calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish_event(&self, kind: EventKind) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(PublishError::Rejected("Mock publish failure".into()));
        }
        self.published.lock().await.push(kind);
        Ok(())
    }
}

type SleepHook = Box<dyn FnOnce() + Send>;

/// Sleeper that returns immediately and records requested durations
#[derive(Default)]
pub struct RecordingSleeper {
    recorded: std::sync::Mutex<Vec<Duration>>,
    hook: std::sync::Mutex<Option<(usize, SleepHook)>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.recorded
            .lock()
            .map(|recorded| recorded.clone())
            .unwrap_or_default()
    }

    /// Run `hook` when the `count`-th sleep is requested
    pub fn on_sleep_count<F>(&self, count: usize, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut slot) = self.hook.lock() {
            *slot = Some((count, Box::new(hook)));
        }
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = match self.recorded.lock() {
            Ok(mut recorded) => {
                recorded.push(duration);
                recorded.len()
            }
            Err(_) => return,
        };

        let hook = match self.hook.lock() {
            Ok(mut slot) if slot.as_ref().is_some_and(|(at, _)| *at == count) => slot.take(),
            _ => None,
        };
        if let Some((_, hook)) = hook {
            hook();
        }

        tokio::task::yield_now().await;
    }
}

/// One scripted `open()` result
#[derive(Debug, Clone)]
pub enum SourceStep {
    /// Fail the open with this HTTP status
    Status(u16),
    /// Open successfully, yield these chunks, then end the stream
    Body(Vec<Vec<u8>>),
    /// Open successfully, yield these chunks, then fail the read
    BodyThenError(Vec<Vec<u8>>),
}

/// Event source replaying a script; answers 503 once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: std::sync::Mutex<VecDeque<SourceStep>>,
    opens: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(steps: Vec<SourceStep>) -> Self {
        Self {
            steps: std::sync::Mutex::new(steps.into()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

/// Body produced by [`ScriptedSource`]
#[derive(Debug)]
pub struct ScriptedBody {
    chunks: VecDeque<Bytes>,
    fail_at_end: bool,
}

#[async_trait]
impl EventBody for ScriptedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.fail_at_end => {
                Err(StreamError::Read("Mock connection reset".into()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    type Body = ScriptedBody;

    async fn open(&self) -> Result<ScriptedBody, StreamError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .ok()
            .and_then(|mut steps| steps.pop_front())
            .unwrap_or(SourceStep::Status(503));

        let (chunks, fail_at_end) = match step {
            SourceStep::Status(status) => return Err(StreamError::Status(status)),
            SourceStep::Body(chunks) => (chunks, false),
            SourceStep::BodyThenError(chunks) => (chunks, true),
        };

        Ok(ScriptedBody {
            chunks: chunks.into_iter().map(Bytes::from).collect(),
            fail_at_end,
        })
    }
}

/// Presence probe with a fixed answer
#[derive(Debug, Clone)]
pub struct MockProbe {
    result: Result<(), ProbeError>,
    calls: Arc<AtomicUsize>,
}

impl MockProbe {
    pub fn okay() -> Self {
        Self {
            result: Ok(()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: ProbeError) -> Self {
        Self {
            result: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresenceProbe for MockProbe {
    async fn announce_online(&self) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_publisher_records_events() {
        let publisher = MockPublisher::new();
        publisher
            .publish_event(EventKind::DoorbellPressed)
            .await
            .unwrap();

        assert_eq!(publisher.published().await, vec![EventKind::DoorbellPressed]);
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failing_publisher_counts_attempts() {
        let publisher = MockPublisher::with_failure();
        assert!(publisher
            .publish_event(EventKind::DoorbellPressed)
            .await
            .is_err());
        assert!(publisher.published().await.is_empty());
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_scripted_source_replays_then_fails() {
        let source = ScriptedSource::new(vec![SourceStep::Body(vec![b"line\n".to_vec()])]);

        let mut body = source.open().await.unwrap();
        assert_eq!(body.next_chunk().await.unwrap().unwrap().as_ref(), b"line\n");
        assert!(body.next_chunk().await.unwrap().is_none());

        assert!(matches!(source.open().await, Err(StreamError::Status(503))));
        assert_eq!(source.opens(), 2);
    }

    #[tokio::test]
    async fn test_recording_sleeper_hook_fires_once() {
        let sleeper = RecordingSleeper::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        sleeper.on_sleep_count(2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            sleeper.sleep(Duration::from_secs(5)).await;
        }

        assert_eq!(sleeper.recorded().len(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
