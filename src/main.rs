//! # CIP/ENIP simulator demo binary
//!
//! Wires configuration, the Prometheus metrics endpoint, and a server
//! engine tick loop together against a profile loaded from disk.
//!
//! ## NOT Responsible For
//!
//! - Opening a TCP listener or managing ENIP sessions (external)
//! - Serving a CLI or RPC query surface (external)

use anyhow::{Context, Result};
use cip_sim::config::Config;
use cip_sim::engine::ServerEngine;
use cip_sim::metrics::{MetricsServer, TICKS_TOTAL};
use cip_sim::profile::Profile;
use std::env;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "cip_sim=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting cip-sim v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(environment = %config.environment, "loaded configuration");

    let profile_path = env::args().nth(1).unwrap_or_else(|| "profile.yaml".to_string());
    let profile_text = std::fs::read_to_string(&profile_path)
        .with_context(|| format!("reading profile from {profile_path}"))?;
    let profile: Profile = serde_yaml::from_str(&profile_text).context("parsing profile YAML")?;
    for warning in profile.consistency_warnings() {
        tracing::warn!(warning, "profile consistency warning");
    }

    let engine = ServerEngine::new(profile)?;
    info!(state = %engine.current_state(), "server engine ready");

    let metrics_server = MetricsServer::bind(&config.metrics_bind_addr).context("binding metrics listener")?;
    info!(addr = %config.metrics_bind_addr, "metrics server listening");
    tokio::spawn(async move {
        if let Err(e) = metrics_server.serve().await {
            error!("metrics server error: {e}");
        }
    });

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    info!("engine ready, ticking until shutdown signal");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.tick(Duration::from_millis(100));
                TICKS_TOTAL.inc();
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!(state = %engine.current_state(), "cip-sim stopped");
    Ok(())
}
