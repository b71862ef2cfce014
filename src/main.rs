//! Uptime Monitor - service availability monitoring with email alerts.
//!
//! Probes HTTP endpoints, TCP ports and hosts on a schedule and reports
//! UP/DOWN transitions by email.

mod config;
mod monitor;
mod notify;
mod probe;
mod scheduler;
mod web;

use config::{MonitorConfig, ServerConfig};
use monitor::{resolve_timezone, MonitorContext, MonitoredService, StatusRegistry, DEFAULT_TIMEZONE};
use notify::EmailNotifier;
use probe::NetworkProber;
use scheduler::Scheduler;
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("uptime_monitor=info".parse()?))
        .init();

    let cfg = ServerConfig::load();
    tracing::info!("Loading monitor config from {}", cfg.config_path.display());

    let monitor_cfg = MonitorConfig::load(&cfg.config_path)?;
    let timezone = match &monitor_cfg.timezone {
        Some(name) => resolve_timezone(name, DEFAULT_TIMEZONE),
        None => DEFAULT_TIMEZONE,
    };
    tracing::info!("Using timezone {}", timezone);

    let services: Vec<_> = monitor_cfg
        .services
        .into_iter()
        .map(|def| Arc::new(MonitoredService::new(def, timezone)))
        .collect();

    let notifier = EmailNotifier::new(&monitor_cfg.email);
    if !notifier.is_configured() {
        tracing::warn!("Email configuration incomplete, notifications will be skipped");
    }

    let registry = StatusRegistry::new();
    let ctx = MonitorContext {
        registry: registry.clone(),
        prober: Arc::new(NetworkProber),
        notifier: Arc::new(notifier),
        timezone,
    };

    // Start scheduler
    let scheduler = Scheduler::new(services.clone(), ctx, monitor_cfg.healthcheck);
    let _handles = scheduler.start();

    // Start web server
    let state = AppState {
        services: Arc::new(services),
        registry,
        timezone,
    };
    Server::new(cfg, state).start().await?;

    Ok(())
}
