//! battmon-agent
//!
//! Publishes laptop battery telemetry to an MQTT broker and announces it to
//! Home Assistant through MQTT discovery.
//!
//! # Overview
//!
//! - [`agent::ConnectionSupervisor`] keeps at most one connect attempt in
//!   flight and honors a backoff between failed attempts
//! - [`agent::DiscoveryAnnouncer`] sends the retained discovery descriptors
//!   once per broker session
//! - [`agent::TelemetryPublisher`] publishes a reading when it changed, or
//!   when the heartbeat came due
//! - [`agent::AgentLifecycle`] wires the above from an [`AgentConfig`] and
//!   runs them on a single task
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use battmon_agent::battery::SysfsBatteryReader;
//! use battmon_agent::config::AgentConfig;
//! use battmon_agent::transport::mqtt::MqttBrokerClient;
//! use battmon_agent::AgentLifecycle;
//! use std::sync::Arc;
//!
//! # async fn example() -> battmon_agent::AgentResult<()> {
//! let config = AgentConfig::from_toml_str(
//!     r#"
//! [device]
//! id = "laptop"
//!
//! [mqtt]
//! broker_url = "mqtt://broker.lan:1883"
//! "#,
//! )?;
//!
//! let reader = SysfsBatteryReader::new(&config.battery.path);
//! let mut agent = AgentLifecycle::new(config, Arc::new(MqttBrokerClient::new()), reader)?;
//! agent.start()?;
//! // ...
//! agent.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod battery;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use agent::AgentLifecycle;
pub use config::{AgentConfig, ConfigError};
pub use error::{AgentError, AgentResult};
