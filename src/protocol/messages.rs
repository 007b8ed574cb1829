//! Outbound message payloads
//!
//! Telemetry payloads are bare strings; discovery payloads are JSON
//! descriptors Home Assistant uses to auto-register the entities.

use super::topics::{Metric, TopicBuilder};
use crate::battery::TelemetrySample;
use crate::config::StatusComponent;
use serde::{Deserialize, Serialize};

/// A message ready to hand to the broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn retained(topic: String, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic,
            payload: payload.into(),
            retain: true,
        }
    }

    /// Payload as UTF-8 text, lossy
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Maps the status payload onto the binary sensor's default `ON`/`OFF`:
/// only `charging` is on, every other status is off
pub const CHARGING_VALUE_TEMPLATE: &str = "{{ 'ON' if value == 'charging' else 'OFF' }}";

/// Home Assistant discovery descriptor for one metric
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryDescriptor {
    pub name: String,
    pub state_topic: String,
    pub default_entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    pub unique_id: String,
}

impl DiscoveryDescriptor {
    /// Build the descriptor for `metric`
    pub fn for_metric(topics: &TopicBuilder, metric: Metric) -> Self {
        let base = topics.base_topic();
        let mut descriptor = Self {
            name: String::new(),
            state_topic: topics.state_topic(metric),
            default_entity_id: topics.default_entity_id(metric),
            unit_of_measurement: None,
            device_class: None,
            icon: None,
            value_template: None,
            unique_id: topics.unique_id(metric),
        };

        match metric {
            Metric::Charge => {
                descriptor.name = format!("{base} Battery Charge");
                descriptor.unit_of_measurement = Some("%".to_string());
                descriptor.device_class = Some("battery".to_string());
            }
            Metric::Temperature => {
                descriptor.name = format!("{base} Battery Temperature");
                descriptor.unit_of_measurement = Some("°C".to_string());
                descriptor.device_class = Some("temperature".to_string());
            }
            Metric::Status => {
                descriptor.name = format!("{base} Battery Status");
                match topics.status_component() {
                    StatusComponent::Sensor => {
                        descriptor.icon = Some("mdi:battery".to_string());
                    }
                    StatusComponent::BinarySensor => {
                        descriptor.device_class = Some("battery_charging".to_string());
                        descriptor.value_template = Some(CHARGING_VALUE_TEMPLATE.to_string());
                    }
                }
            }
        }

        descriptor
    }
}

/// Retained discovery messages for all metrics
pub fn discovery_messages(topics: &TopicBuilder) -> Result<Vec<OutboundMessage>, serde_json::Error> {
    Metric::ALL
        .iter()
        .map(|&metric| {
            let descriptor = DiscoveryDescriptor::for_metric(topics, metric);
            let payload = serde_json::to_vec(&descriptor)?;
            Ok(OutboundMessage::retained(
                topics.discovery_topic(metric),
                payload,
            ))
        })
        .collect()
}

/// Retained state messages for one sample: charge, temperature, status
pub fn telemetry_messages(topics: &TopicBuilder, sample: &TelemetrySample) -> Vec<OutboundMessage> {
    vec![
        OutboundMessage::retained(
            topics.state_topic(Metric::Charge),
            sample.percentage.to_string(),
        ),
        OutboundMessage::retained(
            topics.state_topic(Metric::Temperature),
            sample.temperature_payload(),
        ),
        OutboundMessage::retained(
            topics.state_topic(Metric::Status),
            sample.status.as_str(),
        ),
    ]
}
