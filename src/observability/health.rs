//! Status HTTP server
//!
//! Read-only endpoints over the agent's [`ConnectionStatus`] and the global
//! metrics. Nothing served here feeds back into agent control flow.

use crate::agent::status::ConnectionStatus;
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::Filter;

/// HTTP status server
pub struct StatusServer {
    device_id: String,
    port: u16,
    status: ConnectionStatus,
}

impl StatusServer {
    pub fn new(device_id: String, port: u16, status: ConnectionStatus) -> Self {
        Self {
            device_id,
            port,
            status,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// All routes served by the status server
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let status_source = self.status.clone();
        let ready_source = self.status.clone();
        let device_id = self.device_id.clone();

        // GET /status - connection flags
        let status_route = warp::path("status")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let snapshot = status_source.snapshot();
                let device_id = device_id.clone();
                async move {
                    let response = StatusResponse {
                        device_id,
                        connected: snapshot.connected,
                        connecting: snapshot.connecting,
                        timestamp: current_timestamp(),
                    };
                    Ok::<_, Infallible>(warp::reply::json(&response))
                }
            });

        // GET /metrics - counters snapshot
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(|| async {
                Ok::<_, Infallible>(warp::reply::json(&metrics().get_metrics()))
            });

        // GET /ready - 200 only while a broker session is up
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let ready = ready_source.is_connected();
                async move {
                    let response = ReadinessResponse {
                        ready,
                        timestamp: current_timestamp(),
                    };
                    let status_code = if ready {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&response),
                        status_code,
                    ))
                }
            });

        // GET /live - the process is serving requests
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(|| async {
                let response = LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                };
                Ok::<_, Infallible>(warp::reply::json(&response))
            });

        // GET / - endpoint index
        let root_route = warp::path::end().and(warp::get()).and_then(|| async {
            let endpoints: HashMap<&'static str, &'static str> = [
                ("/status", "Broker connection flags"),
                ("/metrics", "Connection and telemetry counters"),
                ("/ready", "200 while connected to the broker, 503 otherwise"),
                ("/live", "Liveness probe"),
            ]
            .into_iter()
            .collect();
            Ok::<_, Infallible>(warp::reply::json(&ApiDocumentationResponse { endpoints }))
        });

        status_route
            .or(metrics_route)
            .or(ready_route)
            .or(live_route)
            .or(root_route)
    }

    /// Serve until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let routes = self.routes();

        match warp::serve(routes).try_bind_with_graceful_shutdown(addr, async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        }) {
            Ok((bound, server)) => {
                tracing::info!(addr = %bound, "Status server listening");
                server.await;
                tracing::info!("Status server stopped");
            }
            Err(e) => {
                tracing::error!(port = self.port, error = %e, "Status server failed to bind");
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    device_id: String,
    connected: bool,
    connecting: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: HashMap<&'static str, &'static str>,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
