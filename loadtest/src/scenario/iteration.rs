//! The body every virtual user loops over
//!
//! One iteration: build the payload, POST it, check the status, pause.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use super::ScenarioOptions;
use super::payload::ScorePayload;
use crate::check::{CheckRegistry, STATUS_OK_CHECK, status_is_ok};
use crate::client::{BodyEncoding, HttpOutcome, LoadClient};

/// Events a VU reports to the run collector
#[derive(Debug, Clone)]
pub enum VuEvent {
    /// A request finished, with or without a response
    Request {
        latency: Duration,
        failed: bool,
        bytes_received: u64,
    },
    /// Request, check and pause all ran to the end
    IterationCompleted,
    /// The iteration was cut off before its pause ended
    IterationInterrupted,
}

/// Per-iteration work shared by all VUs
#[derive(Debug, Clone)]
pub struct IterationBody {
    client: LoadClient,
    checks: CheckRegistry,
    target_url: String,
    body_encoding: BodyEncoding,
    think_time: Duration,
}

impl IterationBody {
    pub fn new(client: LoadClient, checks: CheckRegistry, options: &ScenarioOptions) -> Self {
        Self {
            client,
            checks,
            target_url: options.target_url.clone(),
            body_encoding: options.body_encoding,
            think_time: options.think_time,
        }
    }

    pub fn checks(&self) -> &CheckRegistry {
        &self.checks
    }

    /// Send the payload and evaluate the status check
    pub async fn execute(&self) -> HttpOutcome {
        let payload = ScorePayload::fixed();
        let outcome = self
            .client
            .post(&self.target_url, &payload, self.body_encoding)
            .await;
        self.checks.record(STATUS_OK_CHECK, status_is_ok(&outcome));
        outcome
    }

    /// Full iteration for VU `vu`: request, check, then pause
    ///
    /// The request event is sent before pausing, so it is counted even when
    /// the pause is later cut short.
    pub async fn run(&self, vu: usize, events: &mpsc::Sender<VuEvent>) {
        let outcome = self.execute().await;

        if !status_is_ok(&outcome) {
            debug!(
                vu,
                status = outcome.status_code(),
                error = outcome.error.as_deref().unwrap_or(""),
                "Check '{}' failed",
                STATUS_OK_CHECK
            );
        }

        let _ = events
            .send(VuEvent::Request {
                latency: outcome.latency,
                failed: outcome.is_failed(),
                bytes_received: outcome.bytes_received,
            })
            .await;

        tokio::time::sleep(self.think_time).await;
    }
}
