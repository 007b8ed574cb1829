//! Change-plus-heartbeat publish decision
//!
//! Pure state: no I/O, no clock. The publisher calls [`PublishPolicy::evaluate`]
//! once per connected tick with a valid sample, [`PublishPolicy::record_publish`]
//! when it sends, and [`PublishPolicy::end_tick`] at the end of the tick.

use crate::battery::{SampleKey, TelemetrySample};
use crate::observability::metrics::PublishReason;

/// Tracks the last published key and the heartbeat countdown
#[derive(Debug, Clone)]
pub struct PublishPolicy {
    heartbeat_period: u32,
    heartbeat_counter: u32,
    last_published: Option<SampleKey>,
}

impl PublishPolicy {
    /// `heartbeat_period` is in ticks; zero is treated as one
    pub fn new(heartbeat_period: u32) -> Self {
        let heartbeat_period = heartbeat_period.max(1);
        Self {
            heartbeat_period,
            heartbeat_counter: heartbeat_period,
            last_published: None,
        }
    }

    pub fn heartbeat_period(&self) -> u32 {
        self.heartbeat_period
    }

    pub fn heartbeat_counter(&self) -> u32 {
        self.heartbeat_counter
    }

    pub fn last_published(&self) -> Option<SampleKey> {
        self.last_published
    }

    /// Whether `sample` must be published this tick, and why
    pub fn evaluate(&self, sample: &TelemetrySample) -> Option<PublishReason> {
        if self.last_published != Some(sample.key()) {
            Some(PublishReason::Changed)
        } else if self.heartbeat_counter == 0 {
            Some(PublishReason::Heartbeat)
        } else {
            None
        }
    }

    pub fn record_publish(&mut self, sample: &TelemetrySample) {
        self.last_published = Some(sample.key());
        self.heartbeat_counter = self.heartbeat_period;
    }

    /// One connected tick has elapsed
    pub fn end_tick(&mut self) {
        self.heartbeat_counter = self.heartbeat_counter.saturating_sub(1);
    }

    /// A disconnected tick restarts the heartbeat countdown
    pub fn reset_heartbeat(&mut self) {
        self.heartbeat_counter = self.heartbeat_period;
    }

    /// evaluate + record + end_tick for one connected tick
    pub fn tick(&mut self, sample: &TelemetrySample) -> Option<PublishReason> {
        let decision = self.evaluate(sample);
        if decision.is_some() {
            self.record_publish(sample);
        }
        self.end_tick();
        decision
    }
}
