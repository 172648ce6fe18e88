//! Error types for the load runner and the balancer

use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("VUS must be at least 1")]
    NoVirtualUsers,

    #[error("DURATION must be greater than zero")]
    ZeroDuration,

    #[error("Invalid URL {0:?}")]
    InvalidUrl(String),
}

/// Errors that abort a load test before or after the run itself
///
/// Failed checks and failed requests are never reported through this type;
/// they are tallied in the run summary.
#[derive(Debug, Error)]
pub enum LoadTestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to export summary: {0}")]
    Export(#[from] std::io::Error),

    #[error("Failed to serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by the load balancer
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("No healthy servers available")]
    NoHealthyBackend,

    #[error("Invalid backend URL {0:?}")]
    InvalidBackend(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Failed to read request body: {0}")]
    Body(String),
}
