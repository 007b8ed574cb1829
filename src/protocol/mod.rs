//! Topic scheme and payloads published by the agent

pub mod messages;
pub mod topics;

pub use messages::{
    discovery_messages, telemetry_messages, DiscoveryDescriptor, OutboundMessage,
    CHARGING_VALUE_TEMPLATE,
};
pub use topics::{Metric, TopicBuilder};
