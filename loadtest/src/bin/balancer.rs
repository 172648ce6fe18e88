use anyhow::Context;
use axum::{Router, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use points_loadtest::balancer::{BackendPool, BalancerState, balancer_routes, spawn_health_checker};
use points_loadtest::{Config, logging};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Prometheus handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Exiting gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install the recorder before any metric is touched
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    PROMETHEUS_HANDLE.set(handle).ok();

    logging::init("points_loadtest=info,tower_http=info");

    let config = Config::from_env().context("invalid balancer configuration")?;
    let balancer = config.balancer;
    info!("Starting load balancer with {} backends", balancer.backends.len());

    let pool = Arc::new(BackendPool::new(&balancer.backends));
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build upstream client")?;

    spawn_health_checker(pool.clone(), client.clone(), balancer.health.clone());

    let state = BalancerState { pool, client };
    let app = Router::new()
        .route("/metrics/prometheus", get(prometheus_metrics))
        .merge(balancer_routes(state))
        .layer(TraceLayer::new_for_http());

    info!("Listening on {}", balancer.listen_addr);
    let listener = tokio::net::TcpListener::bind(balancer.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋");
    Ok(())
}
