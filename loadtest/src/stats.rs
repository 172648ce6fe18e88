//! Latency statistics and the end-of-run summary

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::check::CheckSummary;
use crate::error::LoadTestError;
use crate::scenario::{ExecutorKind, ScenarioOptions};

/// Latency samples collected during a run
#[derive(Debug, Default, Clone)]
pub struct LatencyStats {
    pub samples: Vec<Duration>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, latency: Duration) {
        self.samples.push(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nearest-rank percentile (0-100)
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort();

        let rank = (p * sorted.len() as f64 / 100.0).ceil() as usize;
        let idx = rank.saturating_sub(1).min(sorted.len() - 1);
        Some(sorted[idx])
    }

    pub fn min(&self) -> Option<Duration> {
        self.samples.iter().min().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().max().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    /// Condensed view in milliseconds
    pub fn summarize(&self) -> LatencySummary {
        let ms = |d: Option<Duration>| d.map(|d| d.as_secs_f64() * 1000.0);
        LatencySummary {
            count: self.samples.len(),
            avg_ms: ms(self.mean()),
            min_ms: ms(self.min()),
            med_ms: ms(self.percentile(50.0)),
            p90_ms: ms(self.percentile(90.0)),
            p95_ms: ms(self.percentile(95.0)),
            max_ms: ms(self.max()),
        }
    }
}

/// Latency distribution, all values in milliseconds
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub avg_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub med_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

impl LatencySummary {
    fn format(&self) -> String {
        let f = |v: Option<f64>| match v {
            Some(v) => format!("{:.2}ms", v),
            None => "N/A".to_string(),
        };
        format!(
            "avg={} min={} med={} p(90)={} p(95)={} max={}",
            f(self.avg_ms),
            f(self.min_ms),
            f(self.med_ms),
            f(self.p90_ms),
            f(self.p95_ms),
            f(self.max_ms)
        )
    }
}

/// Everything a finished run reports
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub executor: ExecutorKind,
    pub target_url: String,
    pub vus: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub configured_duration: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Iterations that ran request, check and pause to the end
    pub iterations_completed: u64,
    /// Iterations cut off by the hard stop or cancellation
    pub iterations_interrupted: u64,
    pub http_reqs: u64,
    /// Requests without a response or with a status outside 200-399
    pub http_req_failed: u64,
    pub bytes_received: u64,
    pub http_req_duration: LatencySummary,
    /// Most iterations observed running at the same time
    pub peak_concurrency: usize,
    pub checks: Vec<CheckSummary>,
    /// Whether the run was stopped from outside before its deadline
    pub cancelled: bool,
}

fn serialize_secs<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

impl RunSummary {
    /// Summary skeleton for `options`, counters filled in by the executor
    pub fn new(options: &ScenarioOptions, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            executor: options.executor,
            target_url: options.target_url.clone(),
            vus: options.vus,
            configured_duration: options.duration,
            elapsed: Duration::ZERO,
            iterations_completed: 0,
            iterations_interrupted: 0,
            http_reqs: 0,
            http_req_failed: 0,
            bytes_received: 0,
            http_req_duration: LatencyStats::new().summarize(),
            peak_concurrency: 0,
            checks: Vec::new(),
            cancelled: false,
        }
    }

    /// Completed iterations per second over the elapsed time
    pub fn iteration_rate(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.iterations_completed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Failed requests as a fraction (0.0 to 1.0)
    pub fn http_failure_rate(&self) -> f64 {
        if self.http_reqs > 0 {
            self.http_req_failed as f64 / self.http_reqs as f64
        } else {
            0.0
        }
    }

    pub fn checks_passed(&self) -> u64 {
        self.checks.iter().map(|c| c.passes).sum()
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    /// Print a human-readable report to stdout
    pub fn print_summary(&self) {
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " RUN {} ({:?}, {} VUs, {:.0}s)",
            self.run_id,
            self.executor,
            self.vus,
            self.configured_duration.as_secs_f64()
        );
        println!("═══════════════════════════════════════════════════════════════");
        println!();
        println!("   Target:       POST {}", self.target_url);
        println!("   Elapsed:      {:.1}s", self.elapsed.as_secs_f64());
        if self.cancelled {
            println!("   Cancelled:    yes");
        }
        println!();
        println!(" ─── Checks ──────────────────────────────────────────────────");
        for check in &self.checks {
            let mark = if check.fails == 0 { "✓" } else { "✗" };
            println!(
                "   {} {:10} {:>6.2}%  ✓ {}  ✗ {}",
                mark,
                check.name,
                check.pass_rate() * 100.0,
                check.passes,
                check.fails
            );
        }
        println!();
        println!(" ─── HTTP ────────────────────────────────────────────────────");
        println!("   http_reqs:         {}", self.http_reqs);
        println!(
            "   http_req_failed:   {:.2}% ({} of {})",
            self.http_failure_rate() * 100.0,
            self.http_req_failed,
            self.http_reqs
        );
        println!("   http_req_duration: {}", self.http_req_duration.format());
        println!("   data_received:     {} B", self.bytes_received);
        println!();
        println!(" ─── Iterations ──────────────────────────────────────────────");
        println!(
            "   completed:         {} ({:.2}/s)",
            self.iterations_completed,
            self.iteration_rate()
        );
        println!("   interrupted:       {}", self.iterations_interrupted);
        println!("   peak in flight:    {}", self.peak_concurrency);
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }

    /// Generate JSON output for CI
    pub fn to_json(&self) -> Result<String, LoadTestError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the pretty-printed JSON summary to `path`
    pub fn export(&self, path: &Path) -> Result<(), LoadTestError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
