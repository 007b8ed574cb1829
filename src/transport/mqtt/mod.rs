//! MQTT transport built on rumqttc
//!
//! Split into pure state and option handling ([`connection`]), pure event
//! routing ([`message_handler`]) and the impure client ([`client`]).

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{MqttBrokerClient, TEARDOWN_GRACE};
pub use connection::{configure_mqtt_options, MqttError, ReconnectConfig, SessionState};
pub use message_handler::{EventRoute, MessageHandler};
