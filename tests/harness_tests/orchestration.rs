//! Gate handling, static checks and run summaries

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stackcheck::config::StackConfiguration;
use stackcheck::orchestrator::Orchestrator;
use stackcheck::scenarios::{Scenario, SuiteOptions};
use stackcheck::validation::ValidationGate;
use stackcheck::{Outcome, RunGate, SkipReason};

use super::fakes::{assertion_client, stack_outputs, FakeProbe, Op, RecordingProvisioner};

fn suite() -> SuiteOptions {
    SuiteOptions::new(Path::new("/work/site"), "run42")
}

fn orchestrator(provisioner: &Arc<RecordingProvisioner>, probe: &Arc<FakeProbe>) -> Orchestrator {
    Orchestrator::new(provisioner.clone(), assertion_client(probe.clone()))
}

#[tokio::test]
async fn closed_gate_skips_every_destructive_scenario() {
    let provisioner = Arc::new(RecordingProvisioner::new().with_outputs(stack_outputs()));
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::from_lookup(
        "RUN_INTEGRATION_TESTS",
        |_| None,
    ));

    let scenarios = vec![suite().infrastructure_scenario(), suite().function_scenario()];
    let summary = orchestrator.run_all(&scenarios).await;

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.success());
    assert_eq!(provisioner.count(Op::Apply), 0);
    assert_eq!(provisioner.count(Op::Destroy), 0);
    assert!(probe.queried().is_empty());

    for result in orchestrator.results() {
        match result.outcome {
            Outcome::Skipped(SkipReason::OptOut { ref variable }) => {
                assert_eq!(variable, "RUN_INTEGRATION_TESTS")
            }
            other => panic!("expected opt-out skip, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn unconditional_disable_skips_with_its_reason() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator =
        orchestrator(&provisioner, &probe).with_gate(RunGate::disabled("lifecycle disabled"));

    let outcome = orchestrator.run_scenario(&suite().infrastructure_scenario()).await;

    assert!(matches!(outcome, Outcome::Skipped(SkipReason::Disabled { .. })));
    assert!(provisioner.calls().is_empty());
}

#[tokio::test]
async fn static_scenarios_never_touch_lifecycle() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::Enabled);

    let scenarios = vec![suite().format_scenario(), suite().validate_scenario()];
    let summary = orchestrator.run_all(&scenarios).await;

    assert_eq!(summary.passed, 2);
    assert_eq!(provisioner.ops(), vec![Op::FmtCheck, Op::Validate]);
}

#[tokio::test]
async fn validate_runs_without_input_variables() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe);

    orchestrator.run_scenario(&suite().validate_scenario()).await;

    let calls = provisioner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].var_count, 0);
}

#[tokio::test]
async fn full_stack_passes_with_healthy_outputs() {
    let provisioner = Arc::new(RecordingProvisioner::new().with_outputs(stack_outputs()));
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::Enabled);

    let outcome = orchestrator.run_scenario(&suite().infrastructure_scenario()).await;

    assert_eq!(outcome, Outcome::Passed);
    assert_eq!(provisioner.count(Op::Apply), 1);
    assert_eq!(provisioner.count(Op::Destroy), 1);
    let queried: Vec<String> = probe.queried().into_iter().map(|(_, name)| name).collect();
    assert_eq!(queried, vec!["b1".to_string(), "terraform-lock-x".to_string()]);
}

#[tokio::test]
async fn absent_table_fails_and_destroy_still_runs() {
    let provisioner = Arc::new(RecordingProvisioner::new().with_outputs(stack_outputs()));
    let probe = Arc::new(FakeProbe::with_absent(&["terraform-lock-x"]));
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::Enabled);

    let outcome = orchestrator.run_scenario(&suite().infrastructure_scenario()).await;

    match outcome {
        Outcome::Failed(message) => {
            assert!(message.contains("terraform-lock-x"));
            assert!(message.contains("DynamoDB table"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(provisioner.count(Op::Destroy), 1);
}

#[tokio::test]
async fn wrong_distribution_domain_fails_the_scenario() {
    let outputs: Vec<(&str, &str)> = stack_outputs()
        .into_iter()
        .map(|(k, v)| {
            if k == "cloudfront_domain_name" {
                (k, "d123.example.com")
            } else {
                (k, v)
            }
        })
        .collect();
    let provisioner = Arc::new(RecordingProvisioner::new().with_outputs(outputs));
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::Enabled);

    let summary = orchestrator
        .run_all(&[suite().infrastructure_scenario()])
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures, vec!["terraform_infrastructure".to_string()]);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(provisioner.count(Op::Destroy), 1);
}

#[tokio::test]
async fn one_failure_does_not_stop_later_scenarios() {
    let provisioner = Arc::new(
        RecordingProvisioner::new()
            .with_outputs(stack_outputs())
            .failing_fmt(),
    );
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::Enabled);

    let summary = orchestrator
        .run_all(&[suite().format_scenario(), suite().infrastructure_scenario()])
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.passed, 1);
    assert_eq!(provisioner.count(Op::Destroy), 1);
}

#[tokio::test]
async fn gate_is_consulted_once_per_lifecycle_scenario() {
    let provisioner = Arc::new(RecordingProvisioner::new().with_outputs(stack_outputs()));
    let probe = Arc::new(FakeProbe::all_present());
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    let orchestrator = orchestrator(&provisioner, &probe).with_gate_source(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        RunGate::Enabled
    }));

    orchestrator
        .run_all(&[
            suite().format_scenario(),
            suite().infrastructure_scenario(),
            suite().function_scenario(),
        ])
        .await;

    assert_eq!(evaluations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn function_module_is_driven_from_its_own_root() {
    let provisioner = Arc::new(
        RecordingProvisioner::new()
            .with_outputs([("contact_submissions_table_name", "contact-submissions-test")]),
    );
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::Enabled);

    let outcome = orchestrator.run_scenario(&suite().function_scenario()).await;

    assert_eq!(outcome, Outcome::Passed);
    assert!(provisioner
        .calls()
        .iter()
        .all(|c| c.root == Path::new("/work/site/terraform/lambda")));
}

#[tokio::test]
async fn validation_gate_is_idempotent() {
    let provisioner = Arc::new(RecordingProvisioner::new().failing_fmt());
    let gate = ValidationGate::new(provisioner.clone());
    let config = StackConfiguration::new("terraform");

    for _ in 0..2 {
        assert!(gate.format_check(&config).await.is_err());
        assert!(gate.validate(&config).await.is_ok());
    }

    assert_eq!(
        provisioner.ops(),
        vec![Op::FmtCheck, Op::Validate, Op::FmtCheck, Op::Validate]
    );
}

#[tokio::test]
async fn each_scenario_gets_fresh_configuration() {
    let first: Scenario = suite().infrastructure_scenario();
    let second: Scenario = suite().infrastructure_scenario();

    assert!(!Arc::ptr_eq(&first.config, &second.config));
    assert_eq!(first.config, second.config);
}

#[tokio::test]
async fn destroy_failure_fails_an_otherwise_passing_scenario() {
    let provisioner = Arc::new(
        RecordingProvisioner::new()
            .with_outputs(stack_outputs())
            .failing_destroy(),
    );
    let probe = Arc::new(FakeProbe::all_present());
    let orchestrator = orchestrator(&provisioner, &probe).with_gate(RunGate::Enabled);

    let outcome = orchestrator.run_scenario(&suite().infrastructure_scenario()).await;

    match outcome {
        Outcome::Failed(message) => assert!(message.starts_with("destroy failed")),
        other => panic!("expected failure, got {other:?}"),
    }
}
