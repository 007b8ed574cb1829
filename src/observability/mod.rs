//! Observability: structured logging, process metrics and the status server

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::StatusServer;
pub use logging::{LogFormat, init_default_logging, init_logging};
pub use metrics::{MetricsCollector, MetricsSnapshot, PublishReason, metrics};

// Span macros for structured logging
pub use logging::{lifecycle_span, mqtt_span, tick_span};
