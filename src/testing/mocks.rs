//! Mock implementations for testing
//!
//! Provides a scriptable [`MockBrokerClient`] and [`MockBatteryReader`] so the
//! supervisor, publisher and lifecycle can be exercised without a broker or
//! a battery.

use crate::battery::{BatteryReader, ReadError, TelemetrySample};
use crate::config::BrokerSettings;
use crate::transport::{BrokerClient, QoS};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// How [`MockBrokerClient::connect`] resolves
#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    /// Never resolves
    Hang,
    /// Succeeds after the delay
    Delay(Duration),
    /// One entry per call (true = success); succeeds once exhausted
    Script(Vec<bool>),
}

#[derive(Debug, Error)]
#[error("mock broker: {0}")]
pub struct MockBrokerError(pub String);

/// One publish seen by the mock broker
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub qos: QoS,
}

impl RecordedPublish {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock broker client for testing
#[derive(Debug)]
pub struct MockBrokerClient {
    behavior: Mutex<ConnectBehavior>,
    script: Mutex<VecDeque<bool>>,
    connected: AtomicBool,
    publish_fails: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
    published: Mutex<Vec<RecordedPublish>>,
}

impl Default for MockBrokerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even when the connect future is aborted
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self::with_behavior(ConnectBehavior::Succeed)
    }

    pub fn failing() -> Self {
        Self::with_behavior(ConnectBehavior::Fail)
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        let script = match &behavior {
            ConnectBehavior::Script(steps) => steps.iter().copied().collect(),
            _ => VecDeque::new(),
        };
        Self {
            behavior: Mutex::new(behavior),
            script: Mutex::new(script),
            connected: AtomicBool::new(false),
            publish_fails: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    pub async fn set_behavior(&self, behavior: ConnectBehavior) {
        if let ConnectBehavior::Script(steps) = &behavior {
            *self.script.lock().await = steps.iter().copied().collect();
        }
        *self.behavior.lock().await = behavior;
    }

    pub fn set_publish_failure(&self, fail: bool) {
        self.publish_fails.store(fail, Ordering::SeqCst);
    }

    /// Simulate the broker dropping the session
    pub fn drop_session(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Highest number of connect calls ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn published(&self) -> Vec<RecordedPublish> {
        self.published.lock().await.clone()
    }

    pub async fn published_to(&self, topic: &str) -> Vec<RecordedPublish> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.published.lock().await.clear();
    }

    async fn resolve_attempt(&self) -> bool {
        let behavior = self.behavior.lock().await.clone();
        match behavior {
            ConnectBehavior::Succeed => true,
            ConnectBehavior::Fail => false,
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            ConnectBehavior::Script(_) => self.script.lock().await.pop_front().unwrap_or(true),
        }
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    type Error = MockBrokerError;

    async fn connect(&self, _settings: &BrokerSettings) -> Result<(), Self::Error> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight.clone());

        if self.resolve_attempt().await {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            self.connected.store(false, Ordering::SeqCst);
            Err(MockBrokerError("connection refused".to_string()))
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), Self::Error> {
        if self.publish_fails.load(Ordering::SeqCst) {
            return Err(MockBrokerError("publish rejected".to_string()));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MockBrokerError("not connected".to_string()));
        }

        self.published.lock().await.push(RecordedPublish {
            topic: topic.to_string(),
            payload,
            retain,
            qos,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ReaderState {
    script: VecDeque<Result<TelemetrySample, ReadError>>,
    current: Option<TelemetrySample>,
    reads: usize,
}

/// Mock battery reader for testing
///
/// Scripted results are returned first; after that every read returns the
/// current sample. Clones share state, so a test can keep a handle while the
/// publisher owns the reader.
#[derive(Debug, Clone, Default)]
pub struct MockBatteryReader {
    state: Arc<StdMutex<ReaderState>>,
}

impl MockBatteryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always returns `sample`
    pub fn constant(sample: TelemetrySample) -> Self {
        let reader = Self::new();
        reader.set_sample(sample);
        reader
    }

    /// Returns the given results in order, then fails with `Unavailable`
    pub fn scripted(results: Vec<Result<TelemetrySample, ReadError>>) -> Self {
        let reader = Self::new();
        reader.lock().script = results.into();
        reader
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_sample(&self, sample: TelemetrySample) {
        self.lock().current = Some(sample);
    }

    pub fn push(&self, result: Result<TelemetrySample, ReadError>) {
        self.lock().script.push_back(result);
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }
}

impl BatteryReader for MockBatteryReader {
    fn read(&mut self) -> Result<TelemetrySample, ReadError> {
        let mut state = self.lock();
        state.reads += 1;
        if let Some(result) = state.script.pop_front() {
            return result;
        }
        state
            .current
            .clone()
            .ok_or_else(|| ReadError::Unavailable("mock reader has no sample".to_string()))
    }
}
