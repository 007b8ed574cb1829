//! Battery readings and the reader capability
//!
//! The publisher never cares where a reading comes from; it only needs
//! something implementing [`BatteryReader`]. [`sysfs::SysfsBatteryReader`]
//! is the Linux implementation shipped with the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod sysfs;

pub use sysfs::SysfsBatteryReader;

/// Charge status as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Charging,
    Discharging,
    Full,
    NotCharging,
    Unknown,
}

impl ChargeStatus {
    /// Wire representation published on the status topic
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Charging => "charging",
            ChargeStatus::Discharging => "discharging",
            ChargeStatus::Full => "full",
            ChargeStatus::NotCharging => "not_charging",
            ChargeStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One battery reading. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub percentage: u8,
    /// Degrees Celsius
    pub temperature: f32,
    pub status: ChargeStatus,
    pub captured_at: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn new(percentage: u8, temperature: f32, status: ChargeStatus) -> Self {
        Self {
            percentage,
            temperature,
            status,
            captured_at: Utc::now(),
        }
    }

    /// Reject readings a broken source can produce
    pub fn validate(&self) -> Result<(), ReadError> {
        if self.percentage > 100 {
            return Err(ReadError::OutOfRange(format!(
                "percentage {} exceeds 100",
                self.percentage
            )));
        }
        if !self.temperature.is_finite() {
            return Err(ReadError::OutOfRange(format!(
                "temperature {} is not finite",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Composite used for change detection; temperature is rounded to whole degrees
    pub fn key(&self) -> SampleKey {
        SampleKey {
            percentage: self.percentage,
            status: self.status,
            temperature: self.temperature.round() as i32,
        }
    }

    /// Temperature payload with one decimal
    pub fn temperature_payload(&self) -> String {
        format!("{:.1}", self.temperature)
    }
}

/// Change-detection key of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub percentage: u8,
    pub status: ChargeStatus,
    pub temperature: i32,
}

/// Battery read errors
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {field}: {value:?}")]
    Parse { field: &'static str, value: String },
    #[error("Reading out of range: {0}")]
    OutOfRange(String),
    #[error("Battery source unavailable: {0}")]
    Unavailable(String),
}

/// Source of battery readings
///
/// `Sync` because the publisher borrows itself, reader included, across
/// publish awaits on a spawned task.
pub trait BatteryReader: Send + Sync + 'static {
    /// Take one reading
    fn read(&mut self) -> Result<TelemetrySample, ReadError>;
}
