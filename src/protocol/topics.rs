//! Topic construction for telemetry and Home Assistant discovery

use crate::config::StatusComponent;

/// Metrics exposed by the agent, one topic and one discovery descriptor each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Charge,
    Temperature,
    Status,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Charge, Metric::Temperature, Metric::Status];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Charge => "charge",
            Metric::Temperature => "temperature",
            Metric::Status => "status",
        }
    }
}

/// Builds every topic for one base topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicBuilder {
    base_topic: String,
    discovery_prefix: String,
    status_component: StatusComponent,
}

impl TopicBuilder {
    pub fn new(
        base_topic: impl Into<String>,
        discovery_prefix: impl Into<String>,
        status_component: StatusComponent,
    ) -> Self {
        Self {
            base_topic: base_topic.into(),
            discovery_prefix: discovery_prefix.into(),
            status_component,
        }
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn status_component(&self) -> StatusComponent {
        self.status_component
    }

    /// State topic: `{base}/{metric}`
    pub fn state_topic(&self, metric: Metric) -> String {
        format!("{}/{}", self.base_topic, metric.as_str())
    }

    /// Home Assistant component a metric is announced as
    pub fn component(&self, metric: Metric) -> &'static str {
        match metric {
            Metric::Status => self.status_component.as_str(),
            _ => "sensor",
        }
    }

    /// Discovery topic: `{prefix}/{component}/{base}/{metric}/config`
    pub fn discovery_topic(&self, metric: Metric) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.discovery_prefix,
            self.component(metric),
            self.base_topic,
            metric.as_str()
        )
    }

    /// Stable unique identifier: `{base}_battery_{metric}`
    pub fn unique_id(&self, metric: Metric) -> String {
        format!("{}_battery_{}", self.base_topic, metric.as_str())
    }

    /// Suggested entity id: `{component}.{base}.battery.{metric}`
    pub fn default_entity_id(&self, metric: Metric) -> String {
        format!(
            "{}.{}.battery.{}",
            self.component(metric),
            self.base_topic,
            metric.as_str()
        )
    }
}
