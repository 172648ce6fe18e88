//! Named checks and their pass/fail tally

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::client::HttpOutcome;

/// Name of the status check evaluated every iteration
pub const STATUS_OK_CHECK: &str = "ok";

/// The `ok` check: status must be exactly 200
pub fn status_is_ok(outcome: &HttpOutcome) -> bool {
    outcome.status_code() == 200
}

#[derive(Debug, Default)]
struct Tally {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Shared check tally, one entry per check name
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    tallies: Arc<DashMap<String, Tally>>,
}

/// Point-in-time counts for one check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of passing evaluations, 0.0 when never evaluated
    pub fn pass_rate(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.passes as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one evaluation of `name` and hand back the result
    pub fn record(&self, name: &str, passed: bool) -> bool {
        // Fast path avoids allocating the key once the check is known
        if let Some(tally) = self.tallies.get(name) {
            Self::bump(&tally, passed);
            return passed;
        }
        let tally = self.tallies.entry(name.to_string()).or_default();
        Self::bump(&tally, passed);
        passed
    }

    fn bump(tally: &Tally, passed: bool) {
        if passed {
            tally.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            tally.fails.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of every check, sorted by name
    pub fn snapshot(&self) -> Vec<CheckSummary> {
        let mut checks: Vec<CheckSummary> = self
            .tallies
            .iter()
            .map(|entry| CheckSummary {
                name: entry.key().clone(),
                passes: entry.passes.load(Ordering::Relaxed),
                fails: entry.fails.load(Ordering::Relaxed),
            })
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        checks
    }

    /// Snapshot of a single check
    pub fn get(&self, name: &str) -> Option<CheckSummary> {
        self.tallies.get(name).map(|tally| CheckSummary {
            name: name.to_string(),
            passes: tally.passes.load(Ordering::Relaxed),
            fails: tally.fails.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::time::Duration;

    fn outcome(status: Option<StatusCode>) -> HttpOutcome {
        HttpOutcome {
            status,
            latency: Duration::ZERO,
            bytes_received: 0,
            body: None,
            error: None,
        }
    }

    #[test]
    fn test_status_check_requires_exactly_200() {
        assert!(status_is_ok(&outcome(Some(StatusCode::OK))));
        assert!(!status_is_ok(&outcome(Some(StatusCode::CREATED))));
        assert!(!status_is_ok(&outcome(Some(StatusCode::NO_CONTENT))));
        assert!(!status_is_ok(&outcome(Some(
            StatusCode::INTERNAL_SERVER_ERROR
        ))));
        assert!(!status_is_ok(&outcome(None)));
    }

    #[test]
    fn test_registry_tallies() {
        let registry = CheckRegistry::new();
        assert!(registry.record("ok", true));
        assert!(registry.record("ok", true));
        assert!(!registry.record("ok", false));

        let ok = registry.get("ok").unwrap();
        assert_eq!(ok.passes, 2);
        assert_eq!(ok.fails, 1);
        assert_eq!(ok.total(), 3);
        assert!((ok.pass_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_check() {
        let registry = CheckRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let registry = CheckRegistry::new();
        registry.record("zeta", true);
        registry.record("alpha", false);

        let names: Vec<_> = registry.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_concurrent_recording() {
        let registry = CheckRegistry::new();
        let mut handles = Vec::new();
        for i in 0..10 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    registry.record("ok", i % 2 == 0);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let ok = registry.get("ok").unwrap();
        assert_eq!(ok.passes, 500);
        assert_eq!(ok.fails, 500);
    }
}
