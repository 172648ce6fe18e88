//! Points load test library
//!
//! The constant-VU scenario runner and the round-robin balancer it targets,
//! exported for the binaries and integration tests.

pub mod balancer;
pub mod check;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod scenario;
pub mod stats;

// Re-export commonly used types
pub use check::{CheckRegistry, CheckSummary};
pub use client::{BodyEncoding, HttpOutcome, LoadClient};
pub use config::Config;
pub use error::{BalancerError, ConfigError, LoadTestError};
pub use scenario::{ConstantVusExecutor, ScenarioOptions, ScorePayload};
pub use stats::RunSummary;
