//! HTTP probe implementation.

use reqwest::StatusCode;
use std::time::{Duration, Instant};

use super::ProbeError;

/// Run an HTTP GET probe against the given URL.
///
/// Only a `200 OK` response counts as success.
pub async fn run_http_probe(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))?;

    let start = Instant::now();

    let response = client.get(&url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(ProbeError::Status(status.as_u16()));
    }

    Ok(start.elapsed())
}
