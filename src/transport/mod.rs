//! Broker transport abstraction
//!
//! The agent drives a broker client through [`BrokerClient`]; it never speaks
//! MQTT itself. [`mqtt::MqttBrokerClient`] is the rumqttc implementation.

use crate::config::BrokerSettings;
pub use rumqttc::v5::mqttbytes::QoS;

pub mod mqtt;

/// Capability the connection supervisor drives
///
/// Methods take `&self` so a connect attempt can run on its own task while
/// the owning loop keeps a handle to the same client.
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a session; resolves once the broker acknowledged it or the attempt failed
    async fn connect(&self, settings: &BrokerSettings) -> Result<(), Self::Error>;

    /// Publish one message on the current session
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), Self::Error>;

    /// Tear the session down
    async fn disconnect(&self) -> Result<(), Self::Error>;

    /// Whether the session opened by the last successful `connect` is still alive
    fn is_connected(&self) -> bool;
}

