//! Scenario definition and execution
//!
//! A scenario is a workload shape ([`ScenarioOptions`]) plus the body every
//! virtual user loops over ([`IterationBody`]). The [`ConstantVusExecutor`]
//! keeps a fixed number of VUs busy until the duration elapses.

pub mod executor;
pub mod iteration;
pub mod payload;

use std::time::Duration;

use serde::Serialize;

use crate::client::BodyEncoding;

pub use executor::ConstantVusExecutor;
pub use iteration::{IterationBody, VuEvent};
pub use payload::ScorePayload;

/// How virtual users are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// A fixed number of VUs looping for a fixed duration
    ConstantVus,
}

/// Workload shape, immutable for the whole run
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub executor: ExecutorKind,
    pub target_url: String,
    pub vus: usize,
    pub duration: Duration,
    pub graceful_stop: Duration,
    pub think_time: Duration,
    pub request_timeout: Duration,
    pub discard_response_bodies: bool,
    pub body_encoding: BodyEncoding,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::ConstantVus,
            target_url: "http://localhost:8080/self".to_string(),
            vus: 10,
            duration: Duration::from_secs(45),
            graceful_stop: Duration::from_secs(30),
            think_time: Duration::from_millis(300),
            request_timeout: Duration::from_secs(60),
            discard_response_bodies: true,
            body_encoding: BodyEncoding::Form,
        }
    }
}
