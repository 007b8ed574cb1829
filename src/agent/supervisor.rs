//! Broker connection supervision
//!
//! [`ConnectionSupervisor`] is the only writer of [`ConnectionState`]. Connect
//! attempts run on a spawned task and report back over a channel; the owning
//! task applies the result in `refresh` or `await_outcome`, so no transition
//! ever races the publisher loop.

use crate::agent::status::{ConnectionState, ConnectionStatus};
use crate::config::BrokerSettings;
use crate::observability::metrics::metrics;
use crate::protocol::OutboundMessage;
use crate::transport::{BrokerClient, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one connect attempt as applied by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Failed(String),
}

/// What happened to a single publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the broker client
    Sent,
    /// Not connected; the message was discarded
    Dropped,
    /// The client rejected the publish
    Failed(String),
}

/// Cap for `await_outcome` deadlines that would overflow the clock
const MAX_AWAIT: Duration = Duration::from_secs(24 * 60 * 60);

struct AttemptReport {
    attempt: u64,
    result: Result<(), String>,
}

/// Owns the connection state machine and the per-session discovery flag
pub struct ConnectionSupervisor<C: BrokerClient> {
    client: Arc<C>,
    settings: BrokerSettings,
    state: ConnectionState,
    discovery_announced: bool,
    status: ConnectionStatus,
    report_tx: mpsc::UnboundedSender<AttemptReport>,
    report_rx: mpsc::UnboundedReceiver<AttemptReport>,
    attempt_seq: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl<C: BrokerClient> ConnectionSupervisor<C> {
    pub fn new(client: Arc<C>, settings: BrokerSettings, status: ConnectionStatus) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        status.publish_state(ConnectionState::Disconnected);
        Self {
            client,
            settings,
            state: ConnectionState::Disconnected,
            discovery_announced: false,
            status,
            report_tx,
            report_rx,
            attempt_seq: 0,
            in_flight: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether discovery was announced in the current connected session
    pub fn discovery_announced(&self) -> bool {
        self.discovery_announced
    }

    /// Record that discovery went out for this session; ignored unless connected
    pub fn mark_discovery_announced(&mut self) {
        if self.state == ConnectionState::Connected {
            self.discovery_announced = true;
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Start a connect attempt unless one is running or a session is up
    pub fn ensure_connected(&mut self) {
        if self.state != ConnectionState::Disconnected {
            return;
        }

        self.transition(ConnectionState::Connecting);
        self.attempt_seq += 1;
        metrics().mqtt_connection_attempt();

        let attempt = self.attempt_seq;
        let client = self.client.clone();
        let settings = self.settings.clone();
        let report_tx = self.report_tx.clone();

        info!(
            attempt,
            host = %settings.host,
            port = settings.port,
            "Starting broker connect attempt"
        );
        self.in_flight = Some(tokio::spawn(async move {
            let result = client.connect(&settings).await.map_err(|e| e.to_string());
            // Receiver gone means the supervisor was dropped
            let _ = report_tx.send(AttemptReport { attempt, result });
        }));
    }

    /// Apply delivered connect results and detect a lost session
    pub fn refresh(&mut self) -> Option<ConnectOutcome> {
        let mut applied = None;
        while let Ok(report) = self.report_rx.try_recv() {
            if let Some(outcome) = self.apply_report(report) {
                applied = Some(outcome);
            }
        }

        if self.state == ConnectionState::Connected && !self.client.is_connected() {
            warn!("Broker session lost");
            metrics().mqtt_connection_lost();
            self.transition(ConnectionState::Disconnected);
        }

        applied
    }

    /// Wait up to `timeout` for the in-flight attempt; a timeout counts as failure
    pub async fn await_outcome(&mut self, timeout: Duration) -> Option<ConnectOutcome> {
        if self.state != ConnectionState::Connecting {
            return None;
        }

        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + MAX_AWAIT);
        loop {
            match tokio::time::timeout_at(deadline, self.report_rx.recv()).await {
                Ok(Some(report)) => {
                    if let Some(outcome) = self.apply_report(report) {
                        return Some(outcome);
                    }
                }
                // The supervisor holds a sender, so the channel cannot close
                Ok(None) => return None,
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "Connect attempt timed out");
                    if let Some(handle) = self.in_flight.take() {
                        handle.abort();
                    }
                    metrics().mqtt_connection_failed();
                    self.transition(ConnectionState::Disconnected);
                    return Some(ConnectOutcome::Failed("connect timed out".to_string()));
                }
            }
        }
    }

    /// Tear the session down and force `Disconnected`
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }

        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "Broker disconnect failed");
        }

        if self.state != ConnectionState::Disconnected {
            metrics().mqtt_disconnected();
        }
        self.transition(ConnectionState::Disconnected);
    }

    /// Publish at-least-once if connected; otherwise drop silently
    pub async fn publish(&self, message: &OutboundMessage) -> Delivery {
        if self.state != ConnectionState::Connected || !self.client.is_connected() {
            debug!(topic = %message.topic, "Not connected, dropping message");
            metrics().mqtt_message_dropped();
            return Delivery::Dropped;
        }

        match self
            .client
            .publish(
                &message.topic,
                message.payload.clone(),
                message.retain,
                QoS::AtLeastOnce,
            )
            .await
        {
            Ok(()) => {
                metrics().mqtt_message_published();
                Delivery::Sent
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Publish failed");
                metrics().mqtt_publish_failed();
                Delivery::Failed(e.to_string())
            }
        }
    }

    fn apply_report(&mut self, report: AttemptReport) -> Option<ConnectOutcome> {
        if report.attempt != self.attempt_seq || self.state != ConnectionState::Connecting {
            debug!(attempt = report.attempt, "Ignoring stale connect result");
            return None;
        }
        self.in_flight = None;

        match report.result {
            Ok(()) => {
                info!(attempt = report.attempt, "Connected to broker");
                metrics().mqtt_connection_established();
                self.transition(ConnectionState::Connected);
                Some(ConnectOutcome::Connected)
            }
            Err(reason) => {
                warn!(attempt = report.attempt, error = %reason, "Connect attempt failed");
                metrics().mqtt_connection_failed();
                self.transition(ConnectionState::Disconnected);
                Some(ConnectOutcome::Failed(reason))
            }
        }
    }

    /// Single place where state changes; leaving `Connected` clears the discovery flag
    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if self.state == ConnectionState::Connected {
            self.discovery_announced = false;
        }
        debug!(from = %self.state, to = %next, "Connection state transition");
        self.state = next;
        self.status.publish_state(next);
    }
}

impl<C: BrokerClient> Drop for ConnectionSupervisor<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}
