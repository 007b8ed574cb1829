//! Agent lifecycle and session tests
//!
//! Tests focus on what a broker would observe: which messages arrive, how
//! often discovery goes out per session, and that shutdown always ends with
//! a disconnect.

use battmon_agent::agent::{
    AgentLifecycle, ConnectionStatus, LifecycleError, TelemetryPublisher, TickOutcome,
};
use battmon_agent::battery::{ChargeStatus, TelemetrySample};
use battmon_agent::config::AgentConfig;
use battmon_agent::testing::{ConnectBehavior, MockBatteryReader, MockBrokerClient};
use battmon_agent::transport::BrokerClient;
use std::sync::Arc;
use std::time::Duration;

const DISCOVERY_TOPICS: [&str; 3] = [
    "homeassistant/sensor/Battery_dev/charge/config",
    "homeassistant/sensor/Battery_dev/temperature/config",
    "homeassistant/sensor/Battery_dev/status/config",
];

fn config() -> AgentConfig {
    AgentConfig::from_toml_str(
        r#"
[device]
id = "dev"

[mqtt]
broker_url = "mqtt://localhost:1883"

[telemetry]
tick_interval_ms = 1000
heartbeat_ticks = 60

[reconnect]
sustained_delay_ms = 5000
"#,
    )
    .unwrap()
}

fn reader() -> MockBatteryReader {
    MockBatteryReader::constant(TelemetrySample::new(80, 25.0, ChargeStatus::Discharging))
}

async fn discovery_count(client: &MockBrokerClient, topic: &str) -> usize {
    client.published_to(topic).await.len()
}

#[tokio::test]
async fn test_discovery_announced_once_per_session() {
    let client = Arc::new(MockBrokerClient::new());
    let mut publisher =
        TelemetryPublisher::from_config(&config(), client.clone(), reader(), ConnectionStatus::new())
            .unwrap();

    let first = publisher.tick().await;
    let second = publisher.tick().await;
    let third = publisher.tick().await;

    assert!(first.announced);
    assert!(!second.announced);
    assert!(!third.announced);
    for topic in DISCOVERY_TOPICS {
        assert_eq!(discovery_count(&client, topic).await, 1, "{topic}");
    }
}

#[tokio::test]
async fn test_session_drop_reannounces_exactly_once() {
    let client = Arc::new(MockBrokerClient::new());
    let mut publisher =
        TelemetryPublisher::from_config(&config(), client.clone(), reader(), ConnectionStatus::new())
            .unwrap();

    publisher.tick().await;
    publisher.tick().await;
    assert!(publisher.supervisor().discovery_announced());

    client.drop_session();
    let reconnect = publisher.tick().await;
    let after = publisher.tick().await;

    assert!(reconnect.announced);
    assert!(!after.announced);
    assert_eq!(client.connect_calls(), 2);
    for topic in DISCOVERY_TOPICS {
        assert_eq!(discovery_count(&client, topic).await, 2, "{topic}");
    }
}

#[tokio::test]
async fn test_reconnect_does_not_republish_unchanged_sample() {
    let client = Arc::new(MockBrokerClient::new());
    let mut publisher =
        TelemetryPublisher::from_config(&config(), client.clone(), reader(), ConnectionStatus::new())
            .unwrap();

    publisher.tick().await;
    client.drop_session();
    let report = publisher.tick().await;

    assert_eq!(report.outcome, TickOutcome::Unchanged);
    assert_eq!(client.published_to("Battery_dev/charge").await.len(), 1);
}

#[tokio::test]
async fn test_partial_discovery_failure_is_not_retried_in_session() {
    let client = Arc::new(MockBrokerClient::new());
    client.set_publish_failure(true);
    let mut publisher =
        TelemetryPublisher::from_config(&config(), client.clone(), reader(), ConnectionStatus::new())
            .unwrap();

    let first = publisher.tick().await;
    client.set_publish_failure(false);
    let second = publisher.tick().await;

    assert!(first.announced);
    assert!(!second.announced);
    assert_eq!(discovery_count(&client, DISCOVERY_TOPICS[0]).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_runs_and_shuts_down_with_disconnect() {
    let client = Arc::new(MockBrokerClient::new());
    let mut agent = AgentLifecycle::new(config(), client.clone(), reader()).unwrap();
    let status = agent.status();

    agent.start().unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(agent.is_running());
    assert!(status.is_connected());
    assert_eq!(client.published_to("Battery_dev/charge").await.len(), 1);

    agent.shutdown().await.unwrap();

    assert!(!agent.is_running());
    assert!(!status.is_connected());
    assert!(client.disconnect_calls() >= 1);
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_hung_connect_completes() {
    let client = Arc::new(MockBrokerClient::with_behavior(ConnectBehavior::Hang));
    let mut agent = AgentLifecycle::new(config(), client.clone(), reader())
        .unwrap()
        .with_shutdown_grace(Duration::from_secs(1));
    let status = agent.status();

    agent.start().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(status.is_connecting());

    agent.shutdown().await.unwrap();

    assert!(!status.is_connecting());
    assert!(!status.is_connected());
    assert_eq!(client.connect_calls(), 1);
    assert!(client.disconnect_calls() >= 1);
}

#[tokio::test]
async fn test_lifecycle_misuse_errors() {
    let mut agent =
        AgentLifecycle::new(config(), Arc::new(MockBrokerClient::new()), reader()).unwrap();

    assert!(matches!(
        agent.shutdown().await,
        Err(LifecycleError::NotRunning)
    ));

    agent.start().unwrap();
    assert!(matches!(agent.start(), Err(LifecycleError::AlreadyStarted)));
    agent.shutdown().await.unwrap();
}
