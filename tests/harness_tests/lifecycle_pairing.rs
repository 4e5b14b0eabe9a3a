//! Every apply is paired with exactly one destroy

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use stackcheck::config::StackConfiguration;
use stackcheck::{Error, LifecycleController};

use super::fakes::{Op, RecordingProvisioner};

fn config() -> Arc<StackConfiguration> {
    Arc::new(StackConfiguration::new("terraform").with_var("environment", "test"))
}

#[tokio::test]
async fn successful_body_destroys_once_after_apply() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let controller = LifecycleController::new(provisioner.clone());

    let value = controller
        .run(config(), |_stack| async { Ok(42) })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(provisioner.ops(), vec![Op::Init, Op::Apply, Op::Destroy]);
}

#[tokio::test]
async fn assertion_failure_still_destroys_once() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let controller = LifecycleController::new(provisioner.clone());

    let err = controller
        .run(config(), |_stack| async {
            Err::<(), _>(Error::output_missing("s3_bucket_name", "empty value"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OutputMissing { .. }));
    assert_eq!(provisioner.count(Op::Apply), 1);
    assert_eq!(provisioner.count(Op::Destroy), 1);
}

#[tokio::test]
async fn panicking_body_still_destroys_once() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let controller = LifecycleController::new(provisioner.clone());

    let err = controller
        .run(config(), |_stack| async {
            if true {
                panic!("assertion helper blew up");
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Panicked(ref m) if m.contains("blew up")));
    assert_eq!(provisioner.count(Op::Destroy), 1);
}

#[tokio::test]
async fn failed_apply_skips_body_and_destroys_partial_state() {
    let provisioner = Arc::new(RecordingProvisioner::new().failing_apply());
    let controller = LifecycleController::new(provisioner.clone());
    let mut body_ran = false;

    let err = controller
        .run(config(), |_stack| {
            body_ran = true;
            async { Ok(()) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provisioning { operation: "apply", .. }));
    assert!(!body_ran);
    assert_eq!(provisioner.ops(), vec![Op::Init, Op::Apply, Op::Destroy]);
}

#[tokio::test]
async fn destroy_failure_is_surfaced_with_the_scenario_error() {
    let provisioner = Arc::new(RecordingProvisioner::new().failing_destroy());
    let controller = LifecycleController::new(provisioner.clone());

    let err = controller
        .run(config(), |_stack| async {
            Err::<(), _>(Error::output_missing("api_gateway_url", "not recorded by terraform"))
        })
        .await
        .unwrap_err();

    match err {
        Error::Teardown { destroy, scenario } => {
            assert!(matches!(*destroy, Error::Provisioning { operation: "destroy", .. }));
            assert!(matches!(scenario.as_deref(), Some(Error::OutputMissing { .. })));
        }
        other => panic!("expected teardown error, got {other:?}"),
    }
    assert_eq!(provisioner.count(Op::Destroy), 1);
}

#[tokio::test]
async fn destroy_receives_the_applied_configuration() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let controller = LifecycleController::new(provisioner.clone());

    controller
        .run(config(), |_stack| async { Ok(()) })
        .await
        .unwrap();

    let calls = provisioner.calls();
    let apply = calls.iter().find(|c| c.op == Op::Apply).unwrap();
    let destroy = calls.iter().find(|c| c.op == Op::Destroy).unwrap();
    assert_eq!(apply.root, destroy.root);
    assert_eq!(apply.var_count, destroy.var_count);
}

#[tokio::test]
async fn already_interrupted_run_never_applies() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let controller = LifecycleController::new(provisioner.clone()).with_shutdown(shutdown);

    let err = controller
        .run(config(), |_stack| async { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Interrupted(_)));
    assert!(provisioner.calls().is_empty());
}

#[tokio::test]
async fn interrupt_mid_body_destroys_before_returning() {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let shutdown = CancellationToken::new();
    let controller =
        LifecycleController::new(provisioner.clone()).with_shutdown(shutdown.clone());

    let err = controller
        .run(config(), |_stack| async move {
            shutdown.cancel();
            std::future::pending::<()>().await;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Interrupted(_)));
    assert_eq!(provisioner.ops(), vec![Op::Init, Op::Apply, Op::Destroy]);
}

#[tokio::test]
async fn panicking_apply_is_reported_and_destroyed() {
    let provisioner = Arc::new(RecordingProvisioner::new().panicking_apply());
    let controller = LifecycleController::new(provisioner.clone());

    let err = controller
        .run(config(), |_stack| async { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Panicked(ref m) if m.contains("provider plugin crashed")));
    assert_eq!(provisioner.ops(), vec![Op::Init, Op::Apply, Op::Destroy]);
}

// =============================================================================
// Story: destroy waits for an in-flight apply
// =============================================================================

#[tokio::test(start_paused = true)]
async fn interrupt_during_apply_waits_for_apply_then_destroys() {
    let provisioner =
        Arc::new(RecordingProvisioner::new().slow_apply(Duration::from_millis(200)));
    let shutdown = CancellationToken::new();
    let controller =
        LifecycleController::new(provisioner.clone()).with_shutdown(shutdown.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    let mut body_ran = false;
    let err = controller
        .run(config(), |_stack| {
            body_ran = true;
            async { Ok(()) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Interrupted(ref m) if m.contains("during apply")));
    assert!(!body_ran);
    assert_eq!(provisioner.ops(), vec![Op::Init, Op::Apply, Op::Destroy]);
    let destroy = provisioner.destroy_call().unwrap();
    assert_eq!(destroy.applies_finished, 1, "destroy started before apply returned");
}

#[tokio::test(start_paused = true)]
async fn interrupt_keeps_the_apply_failure() {
    let provisioner = Arc::new(
        RecordingProvisioner::new()
            .slow_apply(Duration::from_millis(200))
            .failing_apply(),
    );
    let shutdown = CancellationToken::new();
    let controller =
        LifecycleController::new(provisioner.clone()).with_shutdown(shutdown.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    let err = controller
        .run(config(), |_stack| async { Ok(()) })
        .await
        .unwrap_err();

    match err {
        Error::Interrupted(message) => assert!(message.contains("creating S3 Bucket")),
        other => panic!("expected interrupt, got {other:?}"),
    }
    assert_eq!(provisioner.count(Op::Destroy), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_run_destroys_only_after_apply_returns() {
    let provisioner =
        Arc::new(RecordingProvisioner::new().slow_apply(Duration::from_millis(300)));
    let controller = LifecycleController::new(provisioner.clone());

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        controller.run(config(), |_stack| async { Ok(()) }),
    )
    .await;
    assert!(result.is_err(), "run should have timed out during apply");
    assert_eq!(provisioner.count(Op::Destroy), 0);

    // The background teardown finishes on its own once apply returns
    for _ in 0..100 {
        if provisioner.count(Op::Destroy) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(provisioner.ops(), vec![Op::Init, Op::Apply, Op::Destroy]);
    let destroy = provisioner.destroy_call().unwrap();
    assert_eq!(destroy.applies_finished, 1, "destroy started before apply returned");
}
