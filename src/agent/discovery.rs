//! Home Assistant discovery announcement
//!
//! Publishes one retained descriptor per metric so Home Assistant registers
//! the entities on its own. The caller decides when to announce; this module
//! only sends.

use crate::agent::supervisor::{ConnectionSupervisor, Delivery};
use crate::config::{AgentConfig, StatusComponent};
use crate::observability::metrics::metrics;
use crate::protocol::{discovery_messages, TopicBuilder};
use crate::transport::BrokerClient;
use tracing::{info, warn};

/// Result of one announcement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnounceReport {
    pub sent: usize,
    pub failed: usize,
    pub dropped: usize,
}

impl AnnounceReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.dropped == 0
    }
}

/// Sends discovery descriptors for a base topic
#[derive(Debug, Clone)]
pub struct DiscoveryAnnouncer {
    prefix: String,
    status_component: StatusComponent,
}

impl DiscoveryAnnouncer {
    pub fn new(prefix: impl Into<String>, status_component: StatusComponent) -> Self {
        Self {
            prefix: prefix.into(),
            status_component,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.discovery.prefix.clone(),
            config.discovery.status_component,
        )
    }

    pub fn topics(&self, base_topic: &str) -> TopicBuilder {
        TopicBuilder::new(base_topic, self.prefix.clone(), self.status_component)
    }

    /// Publish the three descriptors; failures are logged, never returned
    pub async fn announce<C: BrokerClient>(
        &self,
        supervisor: &ConnectionSupervisor<C>,
        base_topic: &str,
    ) -> AnnounceReport {
        let mut report = AnnounceReport::default();

        let messages = match discovery_messages(&self.topics(base_topic)) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Failed to encode discovery descriptors");
                report.failed = 1;
                return report;
            }
        };

        for message in &messages {
            match supervisor.publish(message).await {
                Delivery::Sent => report.sent += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::Failed(_) => report.failed += 1,
            }
        }

        if report.is_complete() {
            metrics().discovery_announced();
            info!(base_topic = %base_topic, descriptors = report.sent, "Discovery announced");
        } else {
            warn!(
                base_topic = %base_topic,
                sent = report.sent,
                failed = report.failed,
                dropped = report.dropped,
                "Discovery announcement incomplete"
            );
        }

        report
    }
}
