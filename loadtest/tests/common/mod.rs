//! Common Test Utilities for Integration Tests
//!
//! Throwaway HTTP targets bound to ephemeral loopback ports.

#![allow(dead_code)]

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use points_loadtest::ScenarioOptions;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A request captured by a recording target
#[derive(Debug, Clone)]
pub struct Recorded {
    pub content_type: String,
    pub body: String,
}

pub type Recordings = Arc<Mutex<Vec<Recorded>>>;

/// Serve `app` on 127.0.0.1 with an OS-assigned port
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Target whose `/self` always answers `status`
pub async fn spawn_status_target(status: StatusCode) -> SocketAddr {
    let app = Router::new().route("/self", post(move || async move { (status, "done") }));
    serve(app).await
}

/// Target whose `/self` answers 200 after `delay`
pub async fn spawn_slow_target(delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/self",
        post(move || async move {
            tokio::time::sleep(delay).await;
            StatusCode::OK
        }),
    );
    serve(app).await
}

/// Target that records every `/self` request
pub async fn spawn_recording_target() -> (SocketAddr, Recordings) {
    let recordings: Recordings = Arc::new(Mutex::new(Vec::new()));
    let sink = recordings.clone();
    let app = Router::new().route(
        "/self",
        post(move |headers: HeaderMap, body: String| {
            let sink = sink.clone();
            async move {
                let content_type = headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                sink.lock().unwrap().push(Recorded { content_type, body });
                StatusCode::OK
            }
        }),
    );
    (serve(app).await, recordings)
}

/// Backend for the balancer: `/ping` answers `ping_status`, anything else
/// answers 200 with `name`
pub async fn spawn_named_backend(name: &'static str, ping_status: StatusCode) -> SocketAddr {
    let app = Router::new()
        .route("/ping", get(move || async move { ping_status }))
        .fallback(move || async move { (StatusCode::OK, name) });
    serve(app).await
}

/// Backend whose `/ping` answers 200 only after `delay`
pub async fn spawn_slow_ping_backend(delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/ping",
        get(move || async move {
            tokio::time::sleep(delay).await;
            StatusCode::OK
        }),
    );
    serve(app).await
}

/// Loopback address nothing listens on
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Short scenario against `addr` suitable for tests
pub fn quick_options(addr: SocketAddr) -> ScenarioOptions {
    ScenarioOptions {
        target_url: format!("http://{}/self", addr),
        vus: 3,
        duration: Duration::from_secs(1),
        graceful_stop: Duration::from_secs(2),
        think_time: Duration::from_millis(100),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Initialize test logging for detailed output
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "points_loadtest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
