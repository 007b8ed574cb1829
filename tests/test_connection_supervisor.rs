//! Connection supervisor behavior
//!
//! - never more than one connect attempt in flight
//! - the discovery flag is only ever set while connected
//! - observers see the same state the supervisor holds

use battmon_agent::agent::{
    ConnectOutcome, ConnectionState, ConnectionStatus, ConnectionSupervisor, Delivery,
};
use battmon_agent::config::{AgentConfig, BrokerSettings};
use battmon_agent::protocol::OutboundMessage;
use battmon_agent::testing::{ConnectBehavior, MockBrokerClient};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> BrokerSettings {
    AgentConfig::from_toml_str(
        r#"
[device]
id = "dev"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    )
    .unwrap()
    .broker_settings()
    .unwrap()
}

fn supervisor(client: MockBrokerClient) -> ConnectionSupervisor<MockBrokerClient> {
    ConnectionSupervisor::new(Arc::new(client), settings(), ConnectionStatus::new())
}

#[tokio::test(start_paused = true)]
async fn test_repeated_ensure_connected_starts_one_attempt() {
    let mut sup = supervisor(MockBrokerClient::with_behavior(ConnectBehavior::Delay(
        Duration::from_secs(10),
    )));

    for _ in 0..5 {
        sup.ensure_connected();
        assert_eq!(sup.state(), ConnectionState::Connecting);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(sup.refresh().is_none());
    }

    let outcome = sup.await_outcome(Duration::from_secs(30)).await;

    assert_eq!(outcome, Some(ConnectOutcome::Connected));
    assert_eq!(sup.client().connect_calls(), 1);
    assert_eq!(sup.client().max_in_flight(), 1);
}

#[tokio::test]
async fn test_ensure_connected_is_noop_while_connected() {
    let mut sup = supervisor(MockBrokerClient::new());
    sup.ensure_connected();
    sup.await_outcome(Duration::from_secs(1)).await;
    assert!(sup.is_connected());

    sup.ensure_connected();
    sup.ensure_connected();

    assert_eq!(sup.client().connect_calls(), 1);
    assert_eq!(sup.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_hung_attempt_times_out_and_allows_retry() {
    let mut sup = supervisor(MockBrokerClient::with_behavior(ConnectBehavior::Hang));

    sup.ensure_connected();
    let outcome = sup.await_outcome(Duration::from_secs(5)).await;
    assert!(matches!(outcome, Some(ConnectOutcome::Failed(_))));
    assert_eq!(sup.state(), ConnectionState::Disconnected);

    sup.client().set_behavior(ConnectBehavior::Succeed).await;
    sup.ensure_connected();
    let outcome = sup.await_outcome(Duration::from_secs(5)).await;

    assert_eq!(outcome, Some(ConnectOutcome::Connected));
    assert_eq!(sup.client().connect_calls(), 2);
}

#[tokio::test]
async fn test_failed_attempt_returns_to_disconnected() {
    let mut sup = supervisor(MockBrokerClient::failing());

    sup.ensure_connected();
    let outcome = sup.await_outcome(Duration::from_secs(1)).await;

    assert!(matches!(outcome, Some(ConnectOutcome::Failed(reason)) if reason.contains("refused")));
    assert_eq!(sup.state(), ConnectionState::Disconnected);
    assert!(!sup.status().is_connected());
    assert!(!sup.status().is_connecting());
}

#[tokio::test]
async fn test_discovery_flag_only_true_while_connected() {
    let mut sup = supervisor(MockBrokerClient::new());

    sup.mark_discovery_announced();
    assert!(!sup.discovery_announced(), "flag must not be set while disconnected");

    sup.ensure_connected();
    sup.mark_discovery_announced();
    assert!(!sup.discovery_announced(), "flag must not be set while connecting");

    sup.await_outcome(Duration::from_secs(1)).await;
    sup.mark_discovery_announced();
    assert!(sup.discovery_announced());

    sup.client().drop_session();
    sup.refresh();

    assert_eq!(sup.state(), ConnectionState::Disconnected);
    assert!(!sup.discovery_announced());
}

#[tokio::test]
async fn test_disconnect_clears_flag_and_status() {
    let mut sup = supervisor(MockBrokerClient::new());
    sup.ensure_connected();
    sup.await_outcome(Duration::from_secs(1)).await;
    sup.mark_discovery_announced();
    assert!(sup.status().is_connected());

    sup.disconnect().await;

    assert_eq!(sup.state(), ConnectionState::Disconnected);
    assert!(!sup.discovery_announced());
    assert!(!sup.status().is_connected());
    assert_eq!(sup.client().disconnect_calls(), 1);
}

#[tokio::test]
async fn test_status_tracks_connecting_and_connected() {
    let status = ConnectionStatus::new();
    let mut sup = ConnectionSupervisor::new(
        Arc::new(MockBrokerClient::with_behavior(ConnectBehavior::Delay(
            Duration::from_millis(50),
        ))),
        settings(),
        status.clone(),
    );

    sup.ensure_connected();
    assert!(status.is_connecting());
    assert!(!status.is_connected());

    sup.await_outcome(Duration::from_secs(1)).await;
    assert!(!status.is_connecting());
    assert!(status.is_connected());
}

#[tokio::test]
async fn test_publish_while_disconnected_is_dropped() {
    let sup = supervisor(MockBrokerClient::new());
    let message = OutboundMessage::retained("Battery_dev/charge".to_string(), "80");

    assert_eq!(sup.publish(&message).await, Delivery::Dropped);
    assert!(sup.client().published().await.is_empty());
}

#[tokio::test]
async fn test_publish_after_session_lost_is_dropped() {
    let mut sup = supervisor(MockBrokerClient::new());
    sup.ensure_connected();
    sup.await_outcome(Duration::from_secs(1)).await;
    sup.client().drop_session();

    let message = OutboundMessage::retained("Battery_dev/charge".to_string(), "80");

    assert_eq!(sup.publish(&message).await, Delivery::Dropped);
}
