//! Backend pool with round-robin selection

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use metrics::gauge;
use reqwest::Url;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::BalancerError;

/// One upstream server
#[derive(Debug)]
pub struct Backend {
    /// Address as registered, without a trailing slash
    address: String,
    url: Url,
    healthy: AtomicBool,
}

impl Backend {
    /// Parse `address`; new backends start out healthy
    pub fn parse(address: &str) -> Result<Self, BalancerError> {
        let address = normalize(address);
        let url =
            Url::parse(&address).map_err(|_| BalancerError::InvalidBackend(address.clone()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(BalancerError::InvalidBackend(address));
        }
        Ok(Self {
            address,
            url,
            healthy: AtomicBool::new(true),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Update the health flag, returning the previous value
    pub fn set_healthy(&self, healthy: bool) -> bool {
        gauge!("balancer_backend_healthy", "backend" => self.address.clone())
            .set(if healthy { 1.0 } else { 0.0 });
        self.healthy.swap(healthy, Ordering::SeqCst)
    }

    /// Report the backend as down once it leaves the pool
    fn retire(&self) {
        gauge!("balancer_backend_healthy", "backend" => self.address.clone()).set(0.0);
    }

    /// Absolute URL for `path_and_query` on this backend
    pub fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.address, path_and_query)
    }
}

fn normalize(address: &str) -> String {
    address.trim().trim_end_matches('/').to_string()
}

/// Registered backends plus the round-robin cursor
#[derive(Debug, Default)]
pub struct BackendPool {
    backends: RwLock<Vec<Arc<Backend>>>,
    cursor: AtomicUsize,
}

impl BackendPool {
    /// Build a pool, skipping addresses that do not parse
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Self {
        let backends: Vec<Arc<Backend>> = addresses
            .iter()
            .filter_map(|addr| match Backend::parse(addr.as_ref()) {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    warn!("Failed to parse server URL: {}", e);
                    None
                }
            })
            .collect();
        gauge!("balancer_backends_registered").set(backends.len() as f64);

        Self {
            backends: RwLock::new(backends),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next healthy backend in round-robin order
    ///
    /// Visits each backend at most once per call; `None` when all are down.
    pub async fn next_healthy(&self) -> Option<Arc<Backend>> {
        let backends = self.backends.read().await;
        if backends.is_empty() {
            return None;
        }

        for _ in 0..backends.len() {
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst).wrapping_add(1) % backends.len();
            let backend = &backends[idx];
            if backend.is_healthy() {
                return Some(backend.clone());
            }
        }
        None
    }

    /// Append a healthy backend
    pub async fn register(&self, address: &str) -> Result<Arc<Backend>, BalancerError> {
        let backend = Arc::new(Backend::parse(address)?);
        let mut backends = self.backends.write().await;
        backends.push(backend.clone());
        gauge!("balancer_backends_registered").set(backends.len() as f64);

        info!("Server {} registered", backend.address());
        Ok(backend)
    }

    /// Remove the first backend registered under `address`
    pub async fn unregister(&self, address: &str) -> bool {
        let address = normalize(address);
        let mut backends = self.backends.write().await;

        match backends.iter().position(|b| b.address() == address) {
            Some(idx) => {
                backends.remove(idx).retire();
                gauge!("balancer_backends_registered").set(backends.len() as f64);
                info!("Server {} unregistered", address);
                true
            }
            None => {
                info!("Server {} not found", address);
                false
            }
        }
    }

    /// Snapshot of the current backends
    pub async fn backends(&self) -> Vec<Arc<Backend>> {
        self.backends.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.backends.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.backends.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

    fn gauge_value(handle: &PrometheusHandle, line_prefix: &str) -> Option<f64> {
        handle
            .render()
            .lines()
            .find(|line| line.starts_with(line_prefix))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    fn pool() -> BackendPool {
        BackendPool::new(&["http://a:1", "http://b:2", "http://c:3"])
    }

    #[test]
    fn test_backend_parse() {
        let backend = Backend::parse("http://localhost:3000/").unwrap();
        assert_eq!(backend.address(), "http://localhost:3000");
        assert!(backend.is_healthy());
        assert_eq!(
            backend.target("/self?x=1"),
            "http://localhost:3000/self?x=1"
        );

        assert!(Backend::parse("not a url").is_err());
        assert!(Backend::parse("ftp://host").is_err());
    }

    #[tokio::test]
    async fn test_invalid_addresses_skipped() {
        let pool = BackendPool::new(&["http://ok:1", "::bad::"]);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_round_robin_order() {
        let pool = pool();
        let picks: Vec<String> = {
            let mut picks = Vec::new();
            for _ in 0..6 {
                picks.push(pool.next_healthy().await.unwrap().address().to_string());
            }
            picks
        };
        assert_eq!(
            picks,
            vec![
                "http://b:2",
                "http://c:3",
                "http://a:1",
                "http://b:2",
                "http://c:3",
                "http://a:1"
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_unhealthy() {
        let pool = pool();
        for backend in pool.backends().await {
            if backend.address() != "http://c:3" {
                backend.set_healthy(false);
            }
        }
        for _ in 0..4 {
            assert_eq!(pool.next_healthy().await.unwrap().address(), "http://c:3");
        }
    }

    #[tokio::test]
    async fn test_none_when_all_unhealthy() {
        let pool = pool();
        for backend in pool.backends().await {
            backend.set_healthy(false);
        }
        assert!(pool.next_healthy().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = BackendPool::new::<&str>(&[]);
        assert!(pool.is_empty().await);
        assert!(pool.next_healthy().await.is_none());
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let pool = pool();
        pool.register("http://d:4").await.unwrap();
        assert_eq!(pool.len().await, 4);

        assert!(pool.unregister("http://b:2/").await);
        assert!(!pool.unregister("http://b:2").await);
        assert_eq!(pool.len().await, 3);

        assert!(pool.register("nope").await.is_err());
        assert_eq!(pool.len().await, 3);
    }

    #[tokio::test]
    async fn test_unregister_zeroes_health_gauge() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);
        let series = r#"balancer_backend_healthy{backend="http://b:2"}"#;

        let pool = pool();
        for backend in pool.backends().await {
            backend.set_healthy(true);
        }
        assert_eq!(gauge_value(&handle, series), Some(1.0));

        assert!(pool.unregister("http://b:2").await);
        assert_eq!(gauge_value(&handle, series), Some(0.0));
    }
}
