//! The telemetry scheduling loop
//!
//! One [`TelemetryPublisher`] runs on one task for the life of the agent and
//! is the single writer of connection state, the discovery flag and the
//! publish policy. Each tick:
//!
//! 1. refresh the supervisor, connecting (and waiting for the outcome) when
//!    not connected; a failed attempt ends the tick with a backoff delay
//! 2. announce discovery once per connected session
//! 3. read and validate one sample; a bad read skips the rest of the tick
//! 4. publish when the sample changed or the heartbeat came due

use crate::agent::discovery::DiscoveryAnnouncer;
use crate::agent::policy::PublishPolicy;
use crate::agent::status::ConnectionStatus;
use crate::agent::supervisor::{ConnectOutcome, ConnectionSupervisor};
use crate::battery::{BatteryReader, TelemetrySample};
use crate::config::{AgentConfig, ConfigError};
use crate::observability::metrics::{metrics, PublishReason};
use crate::protocol::{telemetry_messages, TopicBuilder};
use crate::tick_span;
use crate::transport::mqtt::{ReconnectConfig, TEARDOWN_GRACE};
use crate::transport::BrokerClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// Extra wait on top of the client's own connect timeout. A failed attempt
/// may spend up to `TEARDOWN_GRACE` tearing its session down before it
/// reports, so the grace covers that plus a second.
const CONNECT_GRACE: Duration = Duration::from_secs(TEARDOWN_GRACE.as_secs() + 1);

/// Timing knobs of the loop
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherOptions {
    pub tick_interval: Duration,
    pub heartbeat_ticks: u32,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl PublisherOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            heartbeat_ticks: config.telemetry.heartbeat_ticks,
            connect_timeout: config.connect_timeout().saturating_add(CONNECT_GRACE),
            reconnect: config.reconnect_config(),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No broker session; nothing was read or published
    Disconnected { consecutive_failures: u32 },
    /// The battery read failed or produced an invalid sample
    ReadSkipped,
    /// Sample matched the last published one and no heartbeat was due
    Unchanged,
    Published(PublishReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    /// Whether discovery went out during this tick
    pub announced: bool,
    /// How long to wait before the next tick
    pub next_delay: Duration,
}

/// Change-plus-heartbeat telemetry publisher
pub struct TelemetryPublisher<C: BrokerClient, R: BatteryReader> {
    supervisor: ConnectionSupervisor<C>,
    announcer: DiscoveryAnnouncer,
    reader: R,
    topics: TopicBuilder,
    policy: PublishPolicy,
    options: PublisherOptions,
    consecutive_failures: u32,
    ticks: u64,
}

impl<C: BrokerClient, R: BatteryReader> TelemetryPublisher<C, R> {
    pub fn new(
        supervisor: ConnectionSupervisor<C>,
        announcer: DiscoveryAnnouncer,
        reader: R,
        base_topic: &str,
        options: PublisherOptions,
    ) -> Self {
        Self {
            topics: announcer.topics(base_topic),
            policy: PublishPolicy::new(options.heartbeat_ticks),
            supervisor,
            announcer,
            reader,
            options,
            consecutive_failures: 0,
            ticks: 0,
        }
    }

    /// Wire a publisher from configuration
    pub fn from_config(
        config: &AgentConfig,
        client: Arc<C>,
        reader: R,
        status: ConnectionStatus,
    ) -> Result<Self, ConfigError> {
        let supervisor = ConnectionSupervisor::new(client, config.broker_settings()?, status);
        Ok(Self::new(
            supervisor,
            DiscoveryAnnouncer::from_config(config),
            reader,
            &config.base_topic(),
            PublisherOptions::from_config(config),
        ))
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }

    pub fn policy(&self) -> &PublishPolicy {
        &self.policy
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one scheduling cycle
    pub async fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let span = tick_span!(tick = self.ticks);
        self.tick_inner().instrument(span).await
    }

    async fn tick_inner(&mut self) -> TickReport {
        if !self.ensure_session().await {
            self.policy.reset_heartbeat();
            let delay = Duration::from_millis(
                self.options
                    .reconnect
                    .calculate_backoff_delay(self.consecutive_failures),
            );
            info!(
                failures = self.consecutive_failures,
                retry_in_ms = delay.as_millis() as u64,
                "Broker unavailable, backing off"
            );
            return TickReport {
                outcome: TickOutcome::Disconnected {
                    consecutive_failures: self.consecutive_failures,
                },
                announced: false,
                next_delay: delay,
            };
        }

        let announced = self.announce_if_needed().await;

        let sample = match self.read_sample() {
            Some(sample) => sample,
            None => {
                return TickReport {
                    outcome: TickOutcome::ReadSkipped,
                    announced,
                    next_delay: self.options.tick_interval,
                }
            }
        };

        let outcome = match self.policy.evaluate(&sample) {
            Some(reason) => {
                self.publish_sample(&sample, reason).await;
                self.policy.record_publish(&sample);
                TickOutcome::Published(reason)
            }
            None => TickOutcome::Unchanged,
        };
        self.policy.end_tick();

        TickReport {
            outcome,
            announced,
            next_delay: self.options.tick_interval,
        }
    }

    /// Make sure a session is up; returns false when this tick is a disconnected one
    async fn ensure_session(&mut self) -> bool {
        self.supervisor.refresh();
        if self.supervisor.is_connected() {
            return true;
        }

        self.supervisor.ensure_connected();
        match self
            .supervisor
            .await_outcome(self.options.connect_timeout)
            .await
        {
            Some(ConnectOutcome::Connected) => {
                self.consecutive_failures = 0;
                true
            }
            Some(ConnectOutcome::Failed(reason)) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                debug!(error = %reason, failures = self.consecutive_failures, "Connect failed");
                false
            }
            None => self.supervisor.is_connected(),
        }
    }

    async fn announce_if_needed(&mut self) -> bool {
        if self.supervisor.discovery_announced() {
            return false;
        }
        self.announcer
            .announce(&self.supervisor, self.topics.base_topic())
            .await;
        // Set even after a partial failure; the next session re-announces
        self.supervisor.mark_discovery_announced();
        true
    }

    fn read_sample(&mut self) -> Option<TelemetrySample> {
        let result = self
            .reader
            .read()
            .and_then(|sample| sample.validate().map(|()| sample));

        match result {
            Ok(sample) => {
                metrics().sample_read();
                Some(sample)
            }
            Err(e) => {
                metrics().sample_read_failed();
                warn!(error = %e, "Battery read failed, skipping tick");
                None
            }
        }
    }

    async fn publish_sample(&self, sample: &TelemetrySample, reason: PublishReason) {
        for message in telemetry_messages(&self.topics, sample) {
            self.supervisor.publish(&message).await;
        }
        metrics().telemetry_published(reason);
        debug!(
            percentage = sample.percentage,
            temperature = sample.temperature,
            status = %sample.status,
            reason = ?reason,
            "Published telemetry"
        );
    }

    /// Tick until `shutdown` turns true, then disconnect
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(base_topic = %self.topics.base_topic(), "Telemetry publisher started");

        loop {
            let report = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                report = self.tick() => report,
            };

            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(report.next_delay) => {}
            }
        }

        info!("Telemetry publisher stopping");
        self.supervisor.disconnect().await;
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
