//! Test orchestrator
//!
//! Drives a list of scenarios through the validation gate or the lifecycle
//! controller and records every outcome in a [`TestHarness`]. Static checks
//! always run. Lifecycle scenarios evaluate the run gate once, at their
//! start, and are reported as skipped when it is closed.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::assertions::AssertionClient;
use crate::gate::{RunGate, RUN_INTEGRATION_TESTS_ENV};
use crate::harness::{Outcome, RunSummary, ScenarioResult, TestHarness};
use crate::lifecycle::LifecycleController;
use crate::provisioner::Provisioner;
use crate::scenarios::{verify_stack, Scenario, ScenarioKind};
use crate::validation::ValidationGate;
use crate::Error;

/// Produces a gate decision at the start of each lifecycle scenario
pub type GateSource = Arc<dyn Fn() -> RunGate + Send + Sync>;

/// Runs scenarios and collects their outcomes
pub struct Orchestrator {
    validation: ValidationGate,
    lifecycle: LifecycleController,
    assertions: AssertionClient,
    gate: GateSource,
    harness: TestHarness,
}

impl Orchestrator {
    /// Orchestrator gated on `RUN_INTEGRATION_TESTS`
    pub fn new(provisioner: Arc<dyn Provisioner>, assertions: AssertionClient) -> Self {
        Self {
            validation: ValidationGate::new(provisioner.clone()),
            lifecycle: LifecycleController::new(provisioner),
            assertions,
            gate: Arc::new(|| RunGate::from_env(RUN_INTEGRATION_TESTS_ENV)),
            harness: TestHarness::new("stack integration"),
        }
    }

    /// Replace the gate with a fixed decision
    pub fn with_gate(mut self, gate: RunGate) -> Self {
        self.gate = Arc::new(move || gate.clone());
        self
    }

    /// Replace the gate with a custom source
    pub fn with_gate_source(mut self, source: GateSource) -> Self {
        self.gate = source;
        self
    }

    /// Tear down and stop on this signal
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.lifecycle = self.lifecycle.with_shutdown(shutdown);
        self
    }

    /// Run one scenario and record its outcome
    pub async fn run_scenario(&self, scenario: &Scenario) -> Outcome {
        match &scenario.kind {
            ScenarioKind::Static(check) => {
                let config = scenario.config.clone();
                self.harness
                    .run(&scenario.name, || async move {
                        self.validation.check(*check, &config).await
                    })
                    .await
            }
            ScenarioKind::Lifecycle {
                region,
                expectations,
            } => {
                let gate = (self.gate)();
                if let Some(reason) = gate.skip_reason() {
                    return self.harness.skip(&scenario.name, reason);
                }

                let config = scenario.config.clone();
                let assertions = self.assertions.clone();
                self.harness
                    .run(&scenario.name, || async move {
                        self.lifecycle
                            .run(config, |stack| async move {
                                verify_stack(&stack, &assertions, region, expectations).await
                            })
                            .await
                            .map_err(|e| {
                                report_lifecycle_failure(&scenario.name, &e);
                                e
                            })
                    })
                    .await
            }
        }
    }

    /// Run scenarios in order; a failure never stops the next scenario
    pub async fn run_all(&self, scenarios: &[Scenario]) -> RunSummary {
        for scenario in scenarios {
            self.run_scenario(scenario).await;
        }
        self.harness.finish()
    }

    /// Outcomes recorded so far
    pub fn results(&self) -> Vec<ScenarioResult> {
        self.harness.results()
    }
}

/// Log what kind of failure ended a lifecycle scenario
fn report_lifecycle_failure(scenario: &str, err: &Error) {
    if matches!(err, Error::Teardown { .. }) {
        error!(scenario = %scenario, "Destroy failed, live resources may remain in the account");
    }
    let cause = err.scenario_error();
    if cause.is_assertion_failure() {
        warn!(scenario = %scenario, error = %cause, "Live resource check failed");
    }
}
