//! Agent lifecycle management
//!
//! Wires the publisher from configuration, runs it on a single task and
//! stops it cooperatively.

use crate::agent::publisher::TelemetryPublisher;
use crate::agent::status::ConnectionStatus;
use crate::battery::BatteryReader;
use crate::config::{AgentConfig, ConfigError};
use crate::lifecycle_span;
use crate::transport::BrokerClient;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

/// How long the publisher gets to disconnect before its task is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the publisher task from start to shutdown
pub struct AgentLifecycle<C: BrokerClient, R: BatteryReader> {
    config: AgentConfig,
    client: Arc<C>,
    status: ConnectionStatus,
    publisher: Option<TelemetryPublisher<C, R>>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    grace: Duration,
}

impl<C: BrokerClient, R: BatteryReader> AgentLifecycle<C, R> {
    /// Create a new agent lifecycle manager with injected dependencies
    pub fn new(config: AgentConfig, client: Arc<C>, reader: R) -> Result<Self, LifecycleError> {
        let status = ConnectionStatus::new();
        let publisher =
            TelemetryPublisher::from_config(&config, client.clone(), reader, status.clone())?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            client,
            status,
            publisher: Some(publisher),
            shutdown_tx,
            handle: None,
            grace: SHUTDOWN_GRACE,
        })
    }

    /// Override the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.config.device.id
    }

    /// Connection flags for observers
    pub fn status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    /// Receiver that flips to true when shutdown starts
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the publisher task
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        let mut publisher = self.publisher.take().ok_or(LifecycleError::AlreadyStarted)?;
        let shutdown_rx = self.shutdown_tx.subscribe();

        let span = lifecycle_span!(device_id = %self.config.device.id);
        self.handle = Some(tokio::spawn(
            async move {
                publisher.run(shutdown_rx).await;
            }
            .instrument(span),
        ));

        info!(device_id = %self.config.device.id, "Agent started");
        Ok(())
    }

    /// Signal cancellation and wait for the publisher to disconnect
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        let mut handle = self.handle.take().ok_or(LifecycleError::NotRunning)?;
        info!(device_id = %self.config.device.id, "Shutting down agent");

        self.shutdown_tx.send_replace(true);

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(Ok(())) => info!("Publisher stopped"),
            Ok(Err(e)) => {
                error!(error = %e, "Publisher task failed");
                self.force_disconnect().await;
            }
            Err(_) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "Publisher did not stop in time, aborting"
                );
                handle.abort();
                self.force_disconnect().await;
            }
        }

        info!("Agent shutdown complete");
        Ok(())
    }

    /// Best-effort disconnect when the publisher could not do it itself
    async fn force_disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "Broker disconnect failed");
        }
    }
}

/// Agent lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Configuration error")]
    Configuration(#[from] ConfigError),
    #[error("Agent already started")]
    AlreadyStarted,
    #[error("Agent is not running")]
    NotRunning,
}
