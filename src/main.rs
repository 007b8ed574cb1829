//! battmon-agent entry point

use battmon_agent::agent::DiscoveryAnnouncer;
use battmon_agent::battery::SysfsBatteryReader;
use battmon_agent::config::AgentConfig;
use battmon_agent::error::{AgentError, AgentResult};
use battmon_agent::observability::{init_default_logging, StatusServer};
use battmon_agent::protocol::discovery_messages;
use battmon_agent::transport::mqtt::MqttBrokerClient;
use battmon_agent::AgentLifecycle;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Battery telemetry agent for MQTT and Home Assistant
#[derive(Parser)]
#[command(name = "battmon-agent")]
#[command(about = "Publishes battery telemetry over MQTT with Home Assistant discovery")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the discovery descriptors the agent would announce
    Discovery,
}

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["battmon.toml", "config/battmon.toml"];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting battmon-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e.sanitized_message());
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Discovery => print_discovery(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e.sanitized_message());
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&PathBuf>) -> AgentResult<AgentConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(AgentConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(AgentConfig::load_from_file(&path)?);
        }
    }

    Err(AgentError::internal_error(
        "No configuration file found. Provide one with -c/--config or create battmon.toml",
    ))
}

async fn run_agent(config: AgentConfig) -> AgentResult<()> {
    info!(device_id = %config.device.id, base_topic = %config.base_topic(), "Agent configured");

    let reader = SysfsBatteryReader::new(&config.battery.path);
    let client = Arc::new(MqttBrokerClient::new());
    let status_settings = config.status.clone();
    let device_id = config.device.id.clone();

    let mut agent = AgentLifecycle::new(config, client, reader)?;

    if status_settings.enabled {
        let port = std::env::var("STATUS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(status_settings.port);
        let server = StatusServer::new(device_id, port, agent.status());
        tokio::spawn(server.run(agent.shutdown_signal()));
    }

    agent.start()?;

    wait_for_shutdown_signal().await;

    info!("Application shutdown initiated");
    agent.shutdown().await?;
    info!("Application shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl-C only");
            let _ = signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Received Ctrl-C, shutting down gracefully...");
}

fn handle_config_command(config: &AgentConfig, show: bool) -> AgentResult<()> {
    config.validate()?;
    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| AgentError::internal_error(format!("Failed to render config: {e}")))?;
        println!("{}", redact_inline_password(&rendered));
    } else {
        println!("Configuration for device '{}' is valid", config.device.id);
    }
    Ok(())
}

fn redact_inline_password(rendered: &str) -> String {
    rendered
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("password =") {
                "password = \"***\"".to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_discovery(config: &AgentConfig) -> AgentResult<()> {
    let topics = DiscoveryAnnouncer::from_config(config).topics(&config.base_topic());
    for message in discovery_messages(&topics)? {
        println!("{} (retained)", message.topic);
        println!("{}", message.payload_str());
        println!();
    }
    Ok(())
}
