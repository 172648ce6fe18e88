//! Periodic backend health checks
//!
//! Each sweep probes `GET <backend>/ping` up to `max_retries` times. A
//! backend is healthy when a probe answers 200 within the timeout.

use std::sync::Arc;
use std::time::Instant;

use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pool::{Backend, BackendPool};
use crate::config::HealthCheckConfig;

/// Probe a single backend
pub async fn probe(client: &Client, backend: &Backend, config: &HealthCheckConfig) -> bool {
    let url = backend.target("/ping");
    let mut slow_responses = 0;

    for attempt in 0..config.max_retries {
        let start = Instant::now();
        let result = client.get(&url).timeout(config.timeout).send().await;
        let elapsed = start.elapsed();

        match result {
            Ok(resp) if resp.status() == StatusCode::OK && elapsed <= config.timeout => {
                return true;
            }
            Ok(resp) => {
                debug!(
                    "Probe {} of {} answered {} in {:?}",
                    attempt + 1,
                    url,
                    resp.status(),
                    elapsed
                );
            }
            Err(e) => {
                debug!("Probe {} of {} failed: {}", attempt + 1, url, e);
            }
        }

        if elapsed >= config.timeout {
            slow_responses += 1;
        }
        if attempt + 1 < config.max_retries {
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    if slow_responses > 0 {
        debug!("{} slow responses from {}", slow_responses, url);
    }
    false
}

/// Probe every backend once and update its flag
pub async fn check_all(pool: &BackendPool, client: &Client, config: &HealthCheckConfig) {
    for backend in pool.backends().await {
        let healthy = probe(client, &backend, config).await;
        let was_healthy = backend.set_healthy(healthy);

        if healthy != was_healthy {
            if healthy {
                info!("Server {} is healthy", backend.address());
            } else {
                warn!("Server {} is unhealthy", backend.address());
            }
        } else {
            debug!(
                "Server {} is {}",
                backend.address(),
                if healthy { "healthy" } else { "unhealthy" }
            );
        }
    }
}

/// Sweep the pool forever, starting immediately
pub fn spawn_health_checker(
    pool: Arc<BackendPool>,
    client: Client,
    config: HealthCheckConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            check_all(&pool, &client, &config).await;
            tokio::time::sleep(config.interval).await;
        }
    })
}
