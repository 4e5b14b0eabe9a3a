//! Run-all-and-report scenario execution.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{error, info};

use crate::gate::SkipReason;
use crate::lifecycle::panic_message;
use crate::Result;

/// Result of one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Scenario ran and passed
    Passed,
    /// Scenario ran and failed
    Failed(String),
    /// Scenario was intentionally not executed
    Skipped(SkipReason),
}

impl Outcome {
    fn tag(&self) -> &'static str {
        match self {
            Outcome::Passed => "PASS",
            Outcome::Failed(_) => "FAIL",
            Outcome::Skipped(_) => "SKIP",
        }
    }
}

/// Recorded scenario result
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// What happened
    pub outcome: Outcome,
    /// Wall-clock time spent
    pub duration: Duration,
}

/// Totals for a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Scenarios that passed
    pub passed: usize,
    /// Scenarios that failed
    pub failed: usize,
    /// Scenarios that were skipped
    pub skipped: usize,
    /// Names of failed scenarios
    pub failures: Vec<String>,
}

impl RunSummary {
    /// True unless a non-skipped scenario failed
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Process exit status: skipped scenarios never affect it
    pub fn exit_code(&self) -> u8 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

/// Collects scenario outcomes and prints a summary
pub struct TestHarness {
    suite: String,
    results: Mutex<Vec<ScenarioResult>>,
}

impl TestHarness {
    /// Create a harness for a named suite
    pub fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            results: Mutex::new(Vec::new()),
        }
    }

    /// Run a scenario, recording pass/fail. Panics count as failures.
    pub async fn run<F, Fut>(&self, name: &str, f: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        info!(scenario = %name, "Running scenario");
        let start = Instant::now();
        let result = AssertUnwindSafe(async move { f().await })
            .catch_unwind()
            .await;
        let outcome = match result {
            Ok(Ok(())) => Outcome::Passed,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(panic) => Outcome::Failed(format!("PANIC: {}", panic_message(panic))),
        };
        if let Outcome::Failed(ref e) = outcome {
            error!(scenario = %name, error = %e, "Scenario failed");
        }
        self.record(name, outcome.clone(), start.elapsed());
        outcome
    }

    /// Record a skipped scenario
    pub fn skip(&self, name: &str, reason: SkipReason) -> Outcome {
        info!(scenario = %name, reason = %reason, "Scenario skipped");
        let outcome = Outcome::Skipped(reason);
        self.record(name, outcome.clone(), Duration::ZERO);
        outcome
    }

    /// Record an outcome directly
    pub fn record(&self, name: &str, outcome: Outcome, duration: Duration) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ScenarioResult {
                name: name.to_string(),
                outcome,
                duration,
            });
    }

    /// Snapshot of recorded results
    pub fn results(&self) -> Vec<ScenarioResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Log the summary table and return the totals
    pub fn finish(&self) -> RunSummary {
        let results = self.results();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let mut summary = RunSummary::default();

        info!("========================================");
        info!("  {}", self.suite.to_uppercase());
        info!("========================================");
        for r in &results {
            info!(
                "  {}  {:40} {:.1}s",
                r.outcome.tag(),
                r.name,
                r.duration.as_secs_f64()
            );
            match r.outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed(ref e) => {
                    summary.failed += 1;
                    summary.failures.push(r.name.clone());
                    // Truncate very long errors to keep the summary readable
                    let truncated: String = e.chars().take(200).collect();
                    info!("        -> {truncated}");
                }
                Outcome::Skipped(ref reason) => {
                    summary.skipped += 1;
                    info!("        -> {reason}");
                }
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} failed, {} skipped ({:.1}s total)",
            summary.passed,
            summary.failed,
            summary.skipped,
            total_duration.as_secs_f64()
        );
        info!("========================================");

        summary
    }
}
