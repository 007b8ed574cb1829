//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for session state, backoff
//! calculation and MQTT option construction.

use crate::config::BrokerSettings;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use thiserror::Error;

/// State of one broker session as seen by the client
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No session has been opened yet
    Idle,
    /// Waiting for ConnAck
    Connecting,
    /// ConnAck received, session usable
    Up,
    /// Session ended with reason
    Down(String),
}

/// Backoff configuration applied between failed connect attempts
///
/// There is no attempt limit: the agent retries for as long as it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for the first failures (if empty, uses sustained delay)
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: Vec::new(),
            sustained_delay: 600_000, // 10 minutes
        }
    }
}

impl ReconnectConfig {
    /// Calculate backoff delay for the given consecutive failure (1-based)
    pub fn calculate_backoff_delay(&self, failure: u32) -> u64 {
        let index = (failure.saturating_sub(1)) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: SessionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Pure function to configure MQTT options from broker settings
pub fn configure_mqtt_options(settings: &BrokerSettings) -> MqttOptions {
    // Unique client ID per attempt so a half-dead previous session cannot collide
    let client_id = format!(
        "{}-{}",
        settings.client_id,
        chrono::Utc::now().timestamp_millis()
    );
    let mut mqtt_options = MqttOptions::new(client_id, settings.host.clone(), settings.port);

    if settings.use_tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = &settings.username {
        let password = settings.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username.clone(), password);
    }

    mqtt_options.set_keep_alive(settings.keep_alive);
    mqtt_options.set_clean_start(true);

    mqtt_options
}
