//! Constant-VU executor
//!
//! Spawns `vus` tasks that loop the iteration body. A VU only starts a new
//! iteration before the deadline; iterations still running at the deadline
//! get `graceful_stop` to finish and are interrupted after that.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{info, warn};

use super::ScenarioOptions;
use super::iteration::{IterationBody, VuEvent};
use crate::check::CheckRegistry;
use crate::client::LoadClient;
use crate::error::LoadTestError;
use crate::stats::{LatencyStats, RunSummary};

/// Tracks how many iterations are running at once
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Totals built by the collector from VU events
#[derive(Debug, Default)]
struct Totals {
    iterations_completed: u64,
    iterations_interrupted: u64,
    http_reqs: u64,
    http_req_failed: u64,
    bytes_received: u64,
    latencies: LatencyStats,
}

impl Totals {
    fn apply(&mut self, event: VuEvent) {
        match event {
            VuEvent::Request {
                latency,
                failed,
                bytes_received,
            } => {
                self.http_reqs += 1;
                if failed {
                    self.http_req_failed += 1;
                }
                self.bytes_received += bytes_received;
                self.latencies.record(latency);
            }
            VuEvent::IterationCompleted => self.iterations_completed += 1,
            VuEvent::IterationInterrupted => self.iterations_interrupted += 1,
        }
    }
}

/// Fixed pool of virtual users looping for a fixed duration
pub struct ConstantVusExecutor {
    options: ScenarioOptions,
    body: Arc<IterationBody>,
}

impl ConstantVusExecutor {
    /// Build the shared HTTP client and check registry for `options`
    pub fn new(options: ScenarioOptions) -> Result<Self, LoadTestError> {
        let client = LoadClient::new(options.request_timeout, options.discard_response_bodies)?;
        let body = IterationBody::new(client, CheckRegistry::new(), &options);
        Ok(Self {
            options,
            body: Arc::new(body),
        })
    }

    pub fn options(&self) -> &ScenarioOptions {
        &self.options
    }

    pub fn checks(&self) -> &CheckRegistry {
        self.body.checks()
    }

    /// Run for the configured duration
    pub async fn run(&self) -> RunSummary {
        let (_keep_alive, cancel) = watch::channel(false);
        self.run_until_cancelled(cancel).await
    }

    /// Run for the configured duration, or until `cancel` flips to true
    pub async fn run_until_cancelled(&self, cancel: watch::Receiver<bool>) -> RunSummary {
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + self.options.duration;
        let hard_stop = deadline + self.options.graceful_stop;

        let (tx, mut rx) = mpsc::channel::<VuEvent>(50_000);
        let collector = tokio::spawn(async move {
            let mut totals = Totals::default();
            while let Some(event) = rx.recv().await {
                totals.apply(event);
            }
            totals
        });

        info!(
            "Starting {:?} run: {} VUs for {:?} against {}",
            self.options.executor, self.options.vus, self.options.duration, self.options.target_url
        );

        let in_flight = Arc::new(InFlight::default());
        let handles: Vec<_> = (0..self.options.vus)
            .map(|vu| {
                tokio::spawn(run_vu(
                    vu,
                    self.body.clone(),
                    deadline,
                    hard_stop,
                    cancel.clone(),
                    tx.clone(),
                    in_flight.clone(),
                ))
            })
            .collect();

        // Drop the original sender so the collector ends with the last VU
        drop(tx);

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("VU task failed: {}", e);
            }
        }

        let totals = match collector.await {
            Ok(totals) => totals,
            Err(e) => {
                warn!("Event collector failed: {}", e);
                Totals::default()
            }
        };

        let mut summary = RunSummary::new(&self.options, started_at);
        summary.elapsed = start.elapsed();
        summary.iterations_completed = totals.iterations_completed;
        summary.iterations_interrupted = totals.iterations_interrupted;
        summary.http_reqs = totals.http_reqs;
        summary.http_req_failed = totals.http_req_failed;
        summary.bytes_received = totals.bytes_received;
        summary.http_req_duration = totals.latencies.summarize();
        summary.peak_concurrency = in_flight.peak.load(Ordering::SeqCst);
        summary.checks = self.checks().snapshot();
        summary.cancelled = *cancel.borrow();

        info!(
            "Run finished after {:.1}s: {} iterations, {} requests ({} failed)",
            summary.elapsed.as_secs_f64(),
            summary.iterations_completed,
            summary.http_reqs,
            summary.http_req_failed
        );

        summary
    }
}

/// Resolves once `cancel` holds true; never resolves if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_vu(
    vu: usize,
    body: Arc<IterationBody>,
    deadline: Instant,
    hard_stop: Instant,
    mut cancel: watch::Receiver<bool>,
    events: mpsc::Sender<VuEvent>,
    in_flight: Arc<InFlight>,
) {
    loop {
        if Instant::now() >= deadline || *cancel.borrow() {
            break;
        }

        in_flight.enter();
        let finished = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => false,
            _ = tokio::time::sleep_until(hard_stop) => false,
            _ = body.run(vu, &events) => true,
        };
        in_flight.leave();

        if finished {
            let _ = events.send(VuEvent::IterationCompleted).await;
        } else {
            let _ = events.send(VuEvent::IterationInterrupted).await;
            break;
        }
    }
}
