use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use valvewatch::data::duration::{format_duration, parse_duration};
use valvewatch::{
    AlertEvent, CanonicalReading, ClientConfig, CoilPolicy, ConnectionManager, ConnectionState,
    Consumer, DebugEvent, Severity, WebSocketTransport,
};

#[derive(Parser, Debug)]
#[command(name = "valvewatch")]
#[command(about = "Resilient ingestion client for real-time valve telemetry feeds")]
struct Args {
    /// Telemetry endpoint (ws:// or wss://). Repeat to configure failover.
    #[arg(short, long = "endpoint", value_name = "URL")]
    endpoints: Vec<String>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stay disconnected after the first close instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,

    /// Disable threshold alerts
    #[arg(long)]
    no_alerts: bool,

    /// Coil label policy: "immediate" or "debounce"
    #[arg(long)]
    coil_policy: Option<CoilPolicy>,

    /// How long a coil change must hold before it is shown (e.g., "10s")
    #[arg(long)]
    coil_hold: Option<String>,

    /// Batch flush interval (e.g., "75ms")
    #[arg(long)]
    batch_interval: Option<String>,

    /// Heartbeat ping interval (e.g., "18s")
    #[arg(long)]
    heartbeat: Option<String>,
}

/// Reports client output through `tracing`.
struct LoggingConsumer;

impl Consumer for LoggingConsumer {
    fn on_batch(&mut self, readings: &[CanonicalReading]) {
        if let Some(last) = readings.last() {
            info!(
                count = readings.len(),
                device = %last.device_id,
                temperature = last.temperature,
                inlet = last.inlet_pressure,
                outlet_1 = last.outlet_pressure_1,
                outlet_2 = last.outlet_pressure_2,
                coil = %last.coil_in_use,
                status = last.status.as_str(),
                "batch received"
            );
        }
    }

    fn on_status_change(&mut self, state: ConnectionState) {
        info!(state = state.label(), "connection state changed");
    }

    fn on_alert(&mut self, alert: &AlertEvent) {
        match alert.severity {
            Severity::Critical => error!(device = %alert.device_id, "{}", alert.summary()),
            _ => warn!(device = %alert.device_id, "{}", alert.summary()),
        }
    }

    fn on_debug_log(&mut self, event: &DebugEvent) {
        debug!(
            category = event.category.as_str(),
            severity = event.severity.as_str(),
            "{}",
            event.message
        );
    }
}

fn millis(value: &str, flag: &str) -> Result<u64> {
    let duration = parse_duration(value).with_context(|| format!("invalid --{}", flag))?;
    Ok(duration.as_millis() as u64)
}

fn build_config(args: Args) -> Result<ClientConfig> {
    let mut config =
        ClientConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    if !args.endpoints.is_empty() {
        config.endpoints = args.endpoints;
    }
    if args.no_reconnect {
        config.auto_reconnect = false;
    }
    if args.no_alerts {
        config.alerts_enabled = false;
    }
    if let Some(policy) = args.coil_policy {
        config.coil.policy = policy;
    }
    if let Some(hold) = &args.coil_hold {
        config.coil.hold_ms = millis(hold, "coil-hold")?;
    }
    if let Some(interval) = &args.batch_interval {
        config.batch_interval_ms = millis(interval, "batch-interval")?;
    }
    if let Some(interval) = &args.heartbeat {
        config.heartbeat_interval_ms = millis(interval, "heartbeat")?;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = build_config(Args::parse())?;
    info!(
        endpoints = ?config.endpoints,
        batch_interval = %format_duration(config.batch_interval()),
        heartbeat = %format_duration(config.heartbeat_interval()),
        "starting valvewatch"
    );

    let (handle, task) = ConnectionManager::spawn(
        config,
        Arc::new(WebSocketTransport::new()),
        Box::new(LoggingConsumer),
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    let metrics = handle.metrics();
    handle.shutdown()?;
    task.await?;

    info!(
        messages = metrics.total_messages,
        quality = metrics.quality.as_str(),
        endpoint = %metrics.active_endpoint,
        "stopped"
    );
    Ok(())
}
