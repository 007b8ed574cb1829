//! Thread-safe metrics collection system
//!
//! Atomic counters for the connection, discovery and telemetry paths. The
//! status server serializes a [`MetricsSnapshot`] on `GET /metrics`.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Why a telemetry sample was published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishReason {
    /// First reading or the sample key changed
    Changed,
    /// Heartbeat counter reached zero
    Heartbeat,
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Connection
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    sessions_lost: AtomicU64,
    connection_start_time: AtomicU64,

    // Discovery
    discovery_announcements: AtomicU64,

    // Telemetry
    samples_read: AtomicU64,
    read_failures: AtomicU64,
    publishes_changed: AtomicU64,
    publishes_heartbeat: AtomicU64,
    last_publish: AtomicU64,

    // Messages
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    messages_dropped: AtomicU64,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            sessions_lost: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            discovery_announcements: AtomicU64::new(0),
            samples_read: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            publishes_changed: AtomicU64::new(0),
            publishes_heartbeat: AtomicU64::new(0),
            last_publish: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // MQTT metrics
    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        self.sessions_lost.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_disconnected(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discovery_announced(&self) {
        self.discovery_announcements.fetch_add(1, Ordering::Relaxed);
    }

    // Telemetry metrics
    pub fn sample_read(&self) {
        self.samples_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_read_failed(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn telemetry_published(&self, reason: PublishReason) {
        match reason {
            PublishReason::Changed => self.publishes_changed.fetch_add(1, Ordering::Relaxed),
            PublishReason::Heartbeat => self.publishes_heartbeat.fetch_add(1, Ordering::Relaxed),
        };
        self.last_publish
            .store(current_timestamp(), Ordering::Relaxed);
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.sessions_lost,
            &self.connection_start_time,
            &self.discovery_announcements,
            &self.samples_read,
            &self.read_failures,
            &self.publishes_changed,
            &self.publishes_heartbeat,
            &self.last_publish,
            &self.messages_published,
            &self.publish_failures,
            &self.messages_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Calculate connection duration (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if self.mqtt_connected.load(Ordering::Relaxed) {
            let start_time = self.connection_start_time.load(Ordering::Relaxed);
            if start_time > 0 {
                now.saturating_sub(start_time)
            } else {
                0
            }
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        MetricsSnapshot {
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                sessions_lost: self.sessions_lost.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            telemetry: TelemetryMetrics {
                samples_read: self.samples_read.load(Ordering::Relaxed),
                read_failures: self.read_failures.load(Ordering::Relaxed),
                publishes_changed: self.publishes_changed.load(Ordering::Relaxed),
                publishes_heartbeat: self.publishes_heartbeat.load(Ordering::Relaxed),
                discovery_announcements: self.discovery_announcements.load(Ordering::Relaxed),
                last_publish: self.last_publish.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub mqtt: MqttMetrics,
    pub telemetry: TelemetryMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub sessions_lost: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub messages_dropped: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct TelemetryMetrics {
    pub samples_read: u64,
    pub read_failures: u64,
    pub publishes_changed: u64,
    pub publishes_heartbeat: u64,
    pub discovery_announcements: u64,
    pub last_publish: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
