//! Probe module for service checks.
//!
//! Supports HTTP, TCP port and Ping probes.

mod http;
mod ping;
mod port;

pub use http::*;
pub use ping::*;
pub use port::*;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::monitor::CheckKind;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("command failed: {0}")]
    Command(String),
    #[error("probe task failed: {0}")]
    Task(String),
}

impl ProbeError {
    /// Reason to report for a failed attempt against `check`.
    ///
    /// Ordinary probe failures use the kind-specific wording; a task that
    /// died underneath the probe reports its raw error text.
    pub fn reason(&self, check: &CheckKind) -> String {
        match self {
            ProbeError::Task(msg) => msg.clone(),
            _ => check.failure_reason(),
        }
    }
}

/// Something that can perform a single probe attempt.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns the observed round-trip latency on success.
    async fn probe(&self, check: &CheckKind, timeout: Duration) -> Result<Duration, ProbeError>;
}

/// Prober that talks to the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkProber;

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, check: &CheckKind, timeout: Duration) -> Result<Duration, ProbeError> {
        run_probe(check, timeout).await
    }
}

/// Run one probe attempt for the given check.
pub async fn run_probe(check: &CheckKind, timeout: Duration) -> Result<Duration, ProbeError> {
    // Add jitter so services sharing an interval do not fire in lockstep
    let jitter = rand::random::<u64>() % 100;
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let latency = match check {
        CheckKind::Http { url } => run_http_probe(url, timeout).await?,
        CheckKind::Port { host, port } => run_port_probe(host, *port, timeout).await?,
        CheckKind::Ping { host } => run_ping_probe(host, timeout).await?,
    };

    if latency > timeout {
        return Err(ProbeError::Timeout(timeout));
    }

    Ok(latency)
}
