//! Scheduler module for running the service loops.

mod heartbeat;

pub use heartbeat::*;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::HealthcheckConfig;
use crate::monitor::{MonitorContext, MonitoredService, ServiceLoop};

/// Pause before a crashed service loop is started again.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Starts and supervises one loop per service plus the heartbeat.
pub struct Scheduler {
    services: Vec<Arc<MonitoredService>>,
    ctx: MonitorContext,
    healthcheck: HealthcheckConfig,
}

impl Scheduler {
    pub fn new(services: Vec<Arc<MonitoredService>>, ctx: MonitorContext, healthcheck: HealthcheckConfig) -> Self {
        Self {
            services,
            ctx,
            healthcheck,
        }
    }

    /// Spawn every loop. The tasks run until the process exits.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        tracing::info!("Starting scheduler with {} services", self.services.len());

        let mut handles: Vec<_> = self
            .services
            .iter()
            .map(|service| {
                tracing::info!(
                    "Scheduler: Adding service {} ({})",
                    service.name(),
                    service.definition.check.name()
                );
                tokio::spawn(supervise(service.clone(), self.ctx.clone()))
            })
            .collect();

        if let Some(url) = &self.healthcheck.url {
            let interval = Duration::from_secs(self.healthcheck.interval.max(1));
            tracing::info!("Scheduler: Heartbeat to {} every {:?}", url, interval);
            handles.push(tokio::spawn(run_heartbeat(url.clone(), interval)));
        }

        handles
    }
}

/// Keep a service loop alive, restarting it if it panics.
///
/// The loop runs as a child task so a panic unwinds only that task; its
/// last status survives in the registry across restarts.
async fn supervise(service: Arc<MonitoredService>, ctx: MonitorContext) {
    loop {
        let service_loop = ServiceLoop::new(service.clone(), ctx.clone());

        match tokio::spawn(service_loop.run()).await {
            Ok(()) => {
                tracing::warn!("Service loop for {} exited, restarting", service.name());
            }
            Err(e) if e.is_panic() => {
                tracing::error!("Service loop for {} panicked, restarting: {}", service.name(), e);
            }
            Err(e) => {
                tracing::info!("Service loop for {} cancelled: {}", service.name(), e);
                return;
            }
        }

        tokio::time::sleep(RESTART_DELAY).await;
    }
}
