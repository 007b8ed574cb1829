//! Linux power_supply reader
//!
//! Reads `capacity`, `status` and `temp` from a directory such as
//! `/sys/class/power_supply/BAT0`.

use super::{BatteryReader, ChargeStatus, ReadError, TelemetrySample};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct SysfsBatteryReader {
    path: PathBuf,
}

impl SysfsBatteryReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_attribute(&self, name: &str) -> Result<String, ReadError> {
        let file = self.path.join(name);
        std::fs::read_to_string(&file)
            .map(|s| s.trim().to_string())
            .map_err(|source| ReadError::Io {
                path: file.display().to_string(),
                source,
            })
    }

    fn read_capacity(&self) -> Result<u8, ReadError> {
        let raw = self.read_attribute("capacity")?;
        raw.parse::<u8>().map_err(|_| ReadError::Parse {
            field: "capacity",
            value: raw,
        })
    }

    /// Tenths of a degree. No sensor, or a non-positive value, reads as 0.0
    fn read_temperature(&self) -> f32 {
        match self
            .read_attribute("temp")
            .ok()
            .and_then(|raw| raw.parse::<i32>().ok())
        {
            Some(tenths) if tenths > 0 => tenths as f32 / 10.0,
            _ => 0.0,
        }
    }

    fn read_status(&self) -> ChargeStatus {
        match self.read_attribute("status") {
            Ok(raw) => parse_status(&raw),
            Err(e) => {
                debug!(error = %e, "No status attribute, reporting unknown");
                ChargeStatus::Unknown
            }
        }
    }
}

fn parse_status(raw: &str) -> ChargeStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "charging" => ChargeStatus::Charging,
        "discharging" => ChargeStatus::Discharging,
        "full" => ChargeStatus::Full,
        "not charging" => ChargeStatus::NotCharging,
        _ => ChargeStatus::Unknown,
    }
}

impl BatteryReader for SysfsBatteryReader {
    fn read(&mut self) -> Result<TelemetrySample, ReadError> {
        if !self.path.is_dir() {
            return Err(ReadError::Unavailable(format!(
                "{} is not a directory",
                self.path.display()
            )));
        }

        let sample = TelemetrySample::new(
            self.read_capacity()?,
            self.read_temperature(),
            self.read_status(),
        );
        sample.validate()?;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn battery_dir(capacity: &str, status: Option<&str>, temp: Option<&str>) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("capacity"), capacity).unwrap();
        if let Some(status) = status {
            fs::write(dir.path().join("status"), status).unwrap();
        }
        if let Some(temp) = temp {
            fs::write(dir.path().join("temp"), temp).unwrap();
        }
        dir
    }

    #[test]
    fn test_reads_full_power_supply() {
        let dir = battery_dir("80\n", Some("Discharging\n"), Some("253\n"));
        let mut reader = SysfsBatteryReader::new(dir.path());

        let sample = reader.read().unwrap();
        assert_eq!(sample.percentage, 80);
        assert_eq!(sample.status, ChargeStatus::Discharging);
        assert!((sample.temperature - 25.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_temp_reads_zero() {
        let dir = battery_dir("55", Some("Charging"), None);
        let mut reader = SysfsBatteryReader::new(dir.path());

        let sample = reader.read().unwrap();
        assert_eq!(sample.temperature, 0.0);
        assert_eq!(sample.status, ChargeStatus::Charging);
    }

    #[test]
    fn test_missing_status_is_unknown() {
        let dir = battery_dir("55", None, Some("300"));
        let mut reader = SysfsBatteryReader::new(dir.path());

        assert_eq!(reader.read().unwrap().status, ChargeStatus::Unknown);
    }

    #[test]
    fn test_unparsable_capacity_is_error() {
        let dir = battery_dir("lots", Some("Full"), None);
        let mut reader = SysfsBatteryReader::new(dir.path());

        assert!(matches!(
            reader.read(),
            Err(ReadError::Parse {
                field: "capacity",
                ..
            })
        ));
    }

    #[test]
    fn test_capacity_over_100_rejected() {
        let dir = battery_dir("150", Some("Full"), None);
        let mut reader = SysfsBatteryReader::new(dir.path());

        assert!(matches!(reader.read(), Err(ReadError::OutOfRange(_))));
    }

    #[test]
    fn test_missing_directory_unavailable() {
        let mut reader = SysfsBatteryReader::new("/nonexistent/power_supply/BAT9");
        assert!(matches!(reader.read(), Err(ReadError::Unavailable(_))));
    }

    #[test]
    fn test_parse_status_variants() {
        assert_eq!(parse_status("Not charging"), ChargeStatus::NotCharging);
        assert_eq!(parse_status("FULL"), ChargeStatus::Full);
        assert_eq!(parse_status("weird"), ChargeStatus::Unknown);
    }
}
