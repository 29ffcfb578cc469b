//! resocket-probe - connection health probe
//!
//! Connects to a WebSocket endpoint, greets it after every open and logs
//! each lifecycle event as a JSON line until Ctrl+C or until the
//! connection gives up.
//!
//! Usage:
//!   PROBE_CONFIG_PATH=config/probe.yaml ./resocket-probe
//!   ./resocket-probe ws://127.0.0.1:9001     # address from CLI argument

use anyhow::{Context, Result};
use futures::StreamExt;
use resocket::{LifecycleEvent, Metrics, ReconnectingSocket, TungsteniteTransport};
use resocket_tools::bin_common::{
    init_tracing_with_level, load_config_from_env, parse_args, BinaryRunner, ConfigType,
    ProbeConfig, RunConfig, ShutdownManager,
};
use std::sync::Arc;
use tracing::{info, warn};

struct Probe {
    config: ProbeConfig,
    run_config: RunConfig,
    shutdown: Arc<ShutdownManager>,
    last_metrics: Option<Metrics>,
}

impl Probe {
    fn greet(&self, socket: &ReconnectingSocket) {
        for greeting in &self.config.greetings {
            if let Err(e) = socket.send(greeting.as_str()) {
                warn!("Failed to send greeting: {}", e);
            }
        }
    }

    fn log_status(socket: &ReconnectingSocket) {
        let metrics = socket.metrics();
        let status = socket.reconnection_status();
        info!(
            "[STATUS] state={} sent={} received={} reconnects={} attempt={}",
            metrics.connection_state,
            metrics.messages_sent,
            metrics.messages_received,
            metrics.reconnect_count,
            status.attempt_count
        );
    }
}

impl BinaryRunner for Probe {
    async fn run(&mut self) -> Result<()> {
        let connection = self.config.connection_config();
        let socket = ReconnectingSocket::connect(connection, TungsteniteTransport::new())
            .await
            .with_context(|| format!("failed to connect to {}", self.config.address))?;

        let mut events = socket.events();
        let mut heartbeat = tokio::time::interval(self.run_config.heartbeat_interval());
        heartbeat.tick().await;

        loop {
            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else {
                        info!("Event stream ended");
                        break;
                    };

                    info!(event = event.name(), "{}", serde_json::to_string(&event)?);
                    if event == LifecycleEvent::Opened {
                        self.greet(&socket);
                    }
                }
                _ = heartbeat.tick() => Self::log_status(&socket),
                _ = self.shutdown.wait() => {
                    if let Err(e) = socket.close(Some(1000), Some("probe shutting down".to_string())) {
                        warn!("Close failed: {}", e);
                    }
                    break;
                }
            }
        }

        self.last_metrics = Some(socket.metrics());
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        self.last_metrics.as_ref().map(|m| {
            format!(
                "Sent {} / received {} messages, {} reconnects",
                m.messages_sent, m.messages_received, m.reconnect_count
            )
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = load_config_from_env(ConfigType::Probe);
    let mut config = ProbeConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // CLI argument wins over the file and the environment
    if let Some(address) = parse_args().into_iter().next() {
        config.address = address;
        config.validate()?;
    }

    init_tracing_with_level(&config.log_level);
    config.log();

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.spawn_signal_handler();

    let mut probe = Probe {
        run_config: RunConfig::new("resocket-probe").with_heartbeat(config.heartbeat_secs),
        config,
        shutdown,
        last_metrics: None,
    };

    probe.execute().await
}
