//! Configuration system for the battery telemetry agent
//!
//! The whole agent is driven by one immutable [`AgentConfig`] loaded from TOML.
//! Replacing the configuration means tearing down and rebuilding the
//! [`AgentLifecycle`](crate::agent::AgentLifecycle).

use crate::transport::mqtt::ReconnectConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub battery: BatterySection,
    #[serde(default)]
    pub status: StatusSection,
}

/// Device section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Stable device identifier (must match [a-zA-Z0-9._-]+), used to derive the base topic
    pub id: String,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Inline username, used when `username_env` is unset or missing
    pub username: Option<String>,
    /// Inline password, used when `password_env` is unset or missing
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long a single connect attempt may take before it counts as failed
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Upper bound for a single connect attempt
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 3600;

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

/// Scheduling loop cadence and heartbeat period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Publish unchanged readings after this many ticks
    #[serde(default = "default_heartbeat_ticks")]
    pub heartbeat_ticks: u32,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_ticks() -> u32 {
    60
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            heartbeat_ticks: default_heartbeat_ticks(),
        }
    }
}

/// Backoff applied after a failed connect attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Per-failure delays in milliseconds; empty means always use `sustained_delay_ms`
    #[serde(default)]
    pub backoff_pattern_ms: Vec<u64>,
    /// Delay once the pattern is exhausted (default: 600000 = 10 minutes)
    #[serde(default = "default_sustained_delay")]
    pub sustained_delay_ms: u64,
}

fn default_sustained_delay() -> u64 {
    600_000
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            backoff_pattern_ms: Vec::new(),
            sustained_delay_ms: default_sustained_delay(),
        }
    }
}

/// Home Assistant discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    #[serde(default = "default_discovery_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub status_component: StatusComponent,
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            prefix: default_discovery_prefix(),
            status_component: StatusComponent::default(),
        }
    }
}

/// Home Assistant component used for the charge status entity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusComponent {
    #[default]
    Sensor,
    BinarySensor,
}

impl StatusComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusComponent::Sensor => "sensor",
            StatusComponent::BinarySensor => "binary_sensor",
        }
    }
}

/// Battery source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatterySection {
    /// power_supply directory to read from
    #[serde(default = "default_battery_path")]
    pub path: String,
}

fn default_battery_path() -> String {
    "/sys/class/power_supply/BAT0".to_string()
}

impl Default for BatterySection {
    fn default() -> Self {
        Self {
            path: default_battery_path(),
        }
    }
}

/// HTTP status server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSection {
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

fn default_status_enabled() -> bool {
    true
}

fn default_status_port() -> u16 {
    8080
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            enabled: default_status_enabled(),
            port: default_status_port(),
        }
    }
}

/// Everything the broker client needs for one connect attempt
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id)?;
        parse_broker_url(&self.mqtt.broker_url)?;

        if self.telemetry.heartbeat_ticks == 0 {
            return Err(ConfigError::InvalidConfig(
                "telemetry.heartbeat_ticks must be greater than 0".to_string(),
            ));
        }
        if self.telemetry.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "telemetry.tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.reconnect.sustained_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.sustained_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_secs == 0
            || self.mqtt.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.connect_timeout_secs must be between 1 and {MAX_CONNECT_TIMEOUT_SECS}"
            )));
        }
        if self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must be at most {}",
                u16::MAX
            )));
        }
        Ok(())
    }

    /// Base topic every telemetry and discovery topic hangs off
    pub fn base_topic(&self) -> String {
        format!("Battery_{}", self.device.id)
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username, environment first, then inline
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.username_env.as_ref())
            .or_else(|| self.mqtt.username.clone())
    }

    /// Get MQTT password, environment first, then inline
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.password_env.as_ref())
            .or_else(|| self.mqtt.password.clone())
    }

    /// Resolve connection settings for the broker client
    pub fn broker_settings(&self) -> Result<BrokerSettings, ConfigError> {
        let (host, port, use_tls) = parse_broker_url(&self.mqtt.broker_url)?;
        Ok(BrokerSettings {
            client_id: format!("battmon-{}", self.device.id),
            host,
            port,
            use_tls,
            username: self.get_mqtt_username(),
            password: self.get_mqtt_password(),
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            connect_timeout: self.connect_timeout(),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.mqtt.connect_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.tick_interval_ms)
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            backoff_pattern: self.reconnect.backoff_pattern_ms.clone(),
            sustained_delay: self.reconnect.sustained_delay_ms,
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
id = "test-device"

[mqtt]
broker_url = "mqtt://localhost:1883"

[telemetry]
tick_interval_ms = 1000
heartbeat_ticks = 5
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Split a broker URL into host, port and TLS flag
fn parse_broker_url(broker_url: &str) -> Result<(String, u16, bool), ConfigError> {
    let url =
        Url::parse(broker_url).map_err(|_| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;

    let use_tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(ConfigError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .ok_or_else(|| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?
        .to_string();
    let port = url.port().unwrap_or(if use_tls { 8883 } else { 1883 });

    Ok((host, port, use_tls))
}

/// Device IDs end up inside MQTT topics, so keep them to a safe character set
fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if device_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device ID '{device_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[device]
id = "pixel-7"

[mqtt]
broker_url = "mqtts://broker.local:8884"
username_env = "BATTMON_TEST_UNSET_USER"
username = "inline-user"
password = "inline-pass"
keep_alive_secs = 30
connect_timeout_secs = 10

[telemetry]
tick_interval_ms = 500
heartbeat_ticks = 120

[reconnect]
backoff_pattern_ms = [1000, 5000, 30000]
sustained_delay_ms = 60000

[discovery]
prefix = "ha"
status_component = "binary_sensor"

[battery]
path = "/tmp/battery"

[status]
enabled = false
port = 9090
"#;

        let config = AgentConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.device.id, "pixel-7");
        assert_eq!(config.telemetry.heartbeat_ticks, 120);
        assert_eq!(config.discovery.prefix, "ha");
        assert_eq!(
            config.discovery.status_component,
            StatusComponent::BinarySensor
        );
        assert_eq!(config.battery.path, "/tmp/battery");
        assert!(!config.status.enabled);
        assert_eq!(config.status.port, 9090);

        let settings = config.broker_settings().unwrap();
        assert_eq!(settings.host, "broker.local");
        assert_eq!(settings.port, 8884);
        assert!(settings.use_tls);
        assert_eq!(settings.username.as_deref(), Some("inline-user"));
        assert_eq!(settings.password.as_deref(), Some("inline-pass"));
        assert_eq!(settings.keep_alive, Duration::from_secs(30));

        let reconnect = config.reconnect_config();
        assert_eq!(reconnect.backoff_pattern, vec![1000, 5000, 30000]);
        assert_eq!(reconnect.sustained_delay, 60000);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let toml_content = r#"
[device]
id = "minimal"

[mqtt]
broker_url = "mqtt://localhost"
"#;

        let config = AgentConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.telemetry.tick_interval_ms, 1000);
        assert_eq!(config.telemetry.heartbeat_ticks, 60);
        assert!(config.reconnect.backoff_pattern_ms.is_empty());
        assert_eq!(config.reconnect.sustained_delay_ms, 600_000);
        assert_eq!(config.discovery.prefix, "homeassistant");
        assert_eq!(config.discovery.status_component, StatusComponent::Sensor);
        assert_eq!(config.battery.path, "/sys/class/power_supply/BAT0");
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));

        let settings = config.broker_settings().unwrap();
        assert_eq!(settings.port, 1883);
        assert!(!settings.use_tls);
        assert_eq!(settings.client_id, "battmon-minimal");
        assert_eq!(settings.username, None);
    }

    #[test]
    fn test_base_topic() {
        let config = AgentConfig::test_config();
        assert_eq!(config.base_topic(), "Battery_test-device");
    }

    #[test]
    fn test_invalid_device_id() {
        assert!(validate_device_id("invalid/device").is_err());
        assert!(validate_device_id("with space").is_err());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("valid-device_123.test").is_ok());
    }

    #[test]
    fn test_invalid_broker_url() {
        assert!(matches!(
            parse_broker_url("not a url"),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            parse_broker_url("http://localhost:1883"),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        let toml_content = r#"
[device]
id = "dev"

[mqtt]
broker_url = "mqtt://localhost:1883"

[telemetry]
heartbeat_ticks = 0
"#;

        let result = AgentConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_env_credentials_take_precedence() {
        std::env::set_var("BATTMON_CONFIG_TEST_USER", "env-user");
        let mut config = AgentConfig::test_config();
        config.mqtt.username_env = Some("BATTMON_CONFIG_TEST_USER".to_string());
        config.mqtt.username = Some("inline-user".to_string());

        assert_eq!(config.get_mqtt_username().as_deref(), Some("env-user"));
        std::env::remove_var("BATTMON_CONFIG_TEST_USER");
    }
}
