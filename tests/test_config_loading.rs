//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading: defaults, validation
//! and the settings handed to the broker client.

use battmon_agent::config::{
    AgentConfig, ConfigError, StatusComponent, MAX_CONNECT_TIMEOUT_SECS,
};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_minimal_config_uses_defaults() {
    let temp_file = write_config(
        r#"
[device]
id = "laptop"

[mqtt]
broker_url = "mqtt://broker.lan"
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.device.id, "laptop");
    assert_eq!(config.base_topic(), "Battery_laptop");
    assert_eq!(config.tick_interval(), Duration::from_secs(1));
    assert_eq!(config.telemetry.heartbeat_ticks, 60);
    assert_eq!(config.reconnect_config().calculate_backoff_delay(1), 600_000);
    assert_eq!(config.discovery.prefix, "homeassistant");
    assert_eq!(config.discovery.status_component, StatusComponent::Sensor);
    assert_eq!(config.battery.path, "/sys/class/power_supply/BAT0");
    assert!(config.status.enabled);
    assert_eq!(config.status.port, 8080);
}

#[test]
fn test_full_config_overrides_defaults() {
    let temp_file = write_config(
        r#"
[device]
id = "desk.pc-01"

[mqtt]
broker_url = "mqtts://broker.lan"
username = "battmon"
password = "inline-secret"
keep_alive_secs = 30
connect_timeout_secs = 5

[telemetry]
tick_interval_ms = 250
heartbeat_ticks = 12

[reconnect]
backoff_pattern_ms = [1000, 5000]
sustained_delay_ms = 30000

[discovery]
prefix = "ha"
status_component = "binary_sensor"

[battery]
path = "/sys/class/power_supply/BAT1"

[status]
enabled = false
port = 9100
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();
    let settings = config.broker_settings().unwrap();

    assert_eq!(settings.host, "broker.lan");
    assert_eq!(settings.port, 8883);
    assert!(settings.use_tls);
    assert_eq!(settings.client_id, "battmon-desk.pc-01");
    assert_eq!(settings.username.as_deref(), Some("battmon"));
    assert_eq!(settings.password.as_deref(), Some("inline-secret"));
    assert_eq!(settings.keep_alive, Duration::from_secs(30));
    assert_eq!(settings.connect_timeout, Duration::from_secs(5));

    assert_eq!(config.tick_interval(), Duration::from_millis(250));
    assert_eq!(config.reconnect_config().calculate_backoff_delay(2), 5000);
    assert_eq!(config.reconnect_config().calculate_backoff_delay(3), 30000);
    assert_eq!(config.discovery.status_component, StatusComponent::BinarySensor);
    assert!(!config.status.enabled);
}

#[test]
fn test_credentials_from_environment_win_over_inline() {
    std::env::set_var("BATTMON_TEST_MQTT_USER", "env-user");
    let temp_file = write_config(
        r#"
[device]
id = "laptop"

[mqtt]
broker_url = "mqtt://localhost:1883"
username_env = "BATTMON_TEST_MQTT_USER"
username = "inline-user"
password_env = "BATTMON_TEST_MQTT_PASS_UNSET"
password = "inline-pass"
"#,
    );

    let settings = AgentConfig::load_from_file(temp_file.path())
        .unwrap()
        .broker_settings()
        .unwrap();

    assert_eq!(settings.username.as_deref(), Some("env-user"));
    assert_eq!(settings.password.as_deref(), Some("inline-pass"));
    std::env::remove_var("BATTMON_TEST_MQTT_USER");
}

#[test]
fn test_invalid_device_id_rejected() {
    let temp_file = write_config(
        r#"
[device]
id = "my laptop/1"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidDeviceId(_))));
}

#[test]
fn test_unsupported_broker_scheme_rejected() {
    let temp_file = write_config(
        r#"
[device]
id = "laptop"

[mqtt]
broker_url = "http://localhost:1883"
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
}

#[test]
fn test_zero_heartbeat_rejected() {
    let temp_file = write_config(
        r#"
[device]
id = "laptop"

[mqtt]
broker_url = "mqtt://localhost:1883"

[telemetry]
heartbeat_ticks = 0
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_connect_timeout_above_limit_rejected() {
    let temp_file = write_config(
        r#"
[device]
id = "laptop"

[mqtt]
broker_url = "mqtt://localhost:1883"
connect_timeout_secs = 9223372036854775807
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_connect_timeout_at_limit_accepted() {
    let temp_file = write_config(&format!(
        r#"
[device]
id = "laptop"

[mqtt]
broker_url = "mqtt://localhost:1883"
connect_timeout_secs = {MAX_CONNECT_TIMEOUT_SECS}
"#
    ));

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.connect_timeout(),
        Duration::from_secs(MAX_CONNECT_TIMEOUT_SECS)
    );
}

#[test]
fn test_keep_alive_wider_than_u16_rejected() {
    let temp_file = write_config(
        r#"
[device]
id = "laptop"

[mqtt]
broker_url = "mqtt://localhost:1883"
keep_alive_secs = 70000
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_missing_file_is_read_error() {
    let result = AgentConfig::load_from_file(std::path::Path::new("/nonexistent/battmon.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[device\nid = ");

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_mqtt_section_is_parse_error() {
    let temp_file = write_config(
        r#"
[device]
id = "laptop"
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}
