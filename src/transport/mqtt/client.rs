//! Impure I/O operations for MQTT client
//!
//! This module owns the rumqttc client and its event loop task. A session is
//! opened by `connect` and lives until the broker drops it or `disconnect`
//! tears it down. The client never reconnects on its own; retry policy
//! belongs to the caller.

use super::connection::{configure_mqtt_options, MqttError, SessionState};
use super::message_handler::MessageHandler;
use crate::config::BrokerSettings;
use crate::mqtt_span;
use crate::transport::BrokerClient;
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// How long a torn-down event loop gets to exit before it is aborted
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Request channel capacity between AsyncClient and EventLoop
const REQUEST_CAPACITY: usize = 10;

struct Session {
    client: AsyncClient,
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// rumqttc-backed broker client
pub struct MqttBrokerClient {
    state_tx: Arc<watch::Sender<SessionState>>,
    session: Mutex<Option<Session>>,
}

impl Default for MqttBrokerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttBrokerClient {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            state_tx: Arc::new(state_tx),
            session: Mutex::new(None),
        }
    }

    /// Current session state
    pub fn session_state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<SessionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    SessionState::Up => return Ok(()),
                    SessionState::Down(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    SessionState::Idle | SessionState::Connecting => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Drive the rumqttc event loop until the session ends or shutdown is signalled
    async fn run_event_loop(
        mut event_loop: EventLoop,
        state_tx: Arc<watch::Sender<SessionState>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(target: "mqtt_transport", "Event loop shutdown requested");
                        break;
                    }
                }
                event_result = event_loop.poll() => {
                    match event_result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            match MessageHandler::next_state(&route) {
                                Some(SessionState::Up) => {
                                    info!("MQTT session established");
                                    state_tx.send_replace(SessionState::Up);
                                }
                                Some(down @ SessionState::Down(_)) => {
                                    info!(state = ?down, "MQTT session ended");
                                    state_tx.send_replace(down);
                                    break;
                                }
                                _ => {
                                    debug!(target: "mqtt_transport", route = ?route, "MQTT event");
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "MQTT event loop error");
                            state_tx.send_replace(SessionState::Down(e.to_string()));
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Stop a session's event loop, aborting it if it does not exit in time
    async fn teardown(session: Session) {
        // Queue DISCONNECT so the loop can flush it before exiting
        if let Err(e) = session.client.try_disconnect() {
            debug!(target: "mqtt_transport", error = %e, "Disconnect request not queued");
        }

        let mut handle = session.handle;
        match tokio::time::timeout(TEARDOWN_GRACE, &mut handle).await {
            Ok(Ok(())) => debug!(target: "mqtt_transport", "Event loop task stopped"),
            Ok(Err(e)) if !e.is_cancelled() => {
                warn!("Event loop task ended with error: {}", e);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop task didn't stop in time, forcing abort");
                let _ = session.shutdown_tx.send(true);
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl BrokerClient for MqttBrokerClient {
    type Error = MqttError;

    async fn connect(&self, settings: &BrokerSettings) -> Result<(), MqttError> {
        if let Some(previous) = self.session.lock().await.take() {
            debug!(target: "mqtt_transport", "Tearing down previous session before connect");
            Self::teardown(previous).await;
        }

        let mqtt_options = configure_mqtt_options(settings);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        self.state_tx.send_replace(SessionState::Connecting);
        let state_rx = self.state_tx.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            host = %settings.host,
            port = settings.port,
            tls = settings.use_tls,
            "Connecting to MQTT broker"
        );
        let span = mqtt_span!(host = %settings.host, port = settings.port);
        let handle = tokio::spawn(
            Self::run_event_loop(event_loop, self.state_tx.clone(), shutdown_rx).instrument(span),
        );

        *self.session.lock().await = Some(Session {
            client,
            handle,
            shutdown_tx,
        });

        if let Err(e) =
            Self::wait_for_connection_confirmation(state_rx, settings.connect_timeout).await
        {
            if let Some(failed) = self.session.lock().await.take() {
                Self::teardown(failed).await;
            }
            self.state_tx
                .send_replace(SessionState::Down(e.to_string()));
            return Err(e);
        }

        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), MqttError> {
        let current_state = self.session_state();
        if current_state != SessionState::Up {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        let session = self.session.lock().await;
        let session = session.as_ref().ok_or_else(|| MqttError::NotConnected {
            state: SessionState::Idle,
        })?;

        session
            .client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(target: "mqtt_transport", topic = %topic, retain, "Published message");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MqttError> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            Self::teardown(session).await;
            info!("MQTT client disconnected");
        }
        self.state_tx
            .send_replace(SessionState::Down("Client disconnected".to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(*self.state_tx.borrow(), SessionState::Up)
    }
}

impl Drop for MqttBrokerClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.handle.abort();
        }
    }
}
