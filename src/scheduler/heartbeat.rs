//! Liveness ping to an external healthcheck service.

use reqwest::StatusCode;
use std::time::Duration;

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ping `url` every `interval`, forever. Failures are only logged.
pub async fn run_heartbeat(url: String, interval: Duration) {
    let client = match reqwest::Client::builder().timeout(HEARTBEAT_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Heartbeat disabled, failed to build HTTP client: {}", e);
            return;
        }
    };

    loop {
        ping_healthcheck(&client, &url).await;
        tokio::time::sleep(interval).await;
    }
}

/// Send one heartbeat. Returns true when the endpoint answered 200.
pub async fn ping_healthcheck(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) if response.status() == StatusCode::OK => {
            tracing::info!("Healthcheck ping successful");
            true
        }
        Ok(response) => {
            tracing::warn!("Healthcheck ping failed with status code: {}", response.status());
            false
        }
        Err(e) => {
            tracing::error!("Failed to ping healthcheck: {}", e);
            false
        }
    }
}
