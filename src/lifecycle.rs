//! Lifecycle controller: init -> apply -> body -> destroy
//!
//! The controller owns the one hard resource-safety rule of the harness:
//! whatever the scenario body does, the stack it applied is destroyed exactly
//! once before [`LifecycleController::run`] returns.
//!
//! # Ordering
//!
//! - The release action is armed before the first provisioning call.
//! - Init and apply run in their own task, so dropping the run future never
//!   abandons a half-finished apply.
//! - The body never runs unless apply returned success.
//! - Destroy never starts before apply returned, even when interrupted or
//!   when the run future is dropped.
//! - Destroy is attempted once; its failure is reported, not retried.
//!
//! # Exit paths
//!
//! ```text
//! arm release ─> init ─> apply ─┬─> body ─┬─> destroy ─> result
//!                 │       │      │         ├─ Err
//!                 │       │      │         ├─ panic
//!                 │       │      │         └─ interrupt
//!                 └───────┴──────┴─ Err / panic / interrupt ──> destroy
//!
//! run future dropped ─> (await apply task) ─> destroy in background
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::StackConfiguration;
use crate::outputs::OutputReader;
use crate::provisioner::Provisioner;
use crate::{Error, Result};

/// In-flight init + apply
type ApplyTask = JoinHandle<Result<String>>;

/// Handle to a successfully applied stack, passed to the scenario body
#[derive(Clone)]
pub struct LiveStack {
    provisioner: Arc<dyn Provisioner>,
    config: Arc<StackConfiguration>,
}

impl LiveStack {
    /// Configuration that produced this stack
    pub fn config(&self) -> &StackConfiguration {
        &self.config
    }

    /// Reader for this stack's outputs
    pub fn outputs(&self) -> OutputReader {
        OutputReader::new(self.provisioner.clone(), self.config.clone())
    }
}

/// Scoped release of live infrastructure.
///
/// Consumed by [`ReleaseAction::execute`], so destroy can only be issued once.
/// While apply is in flight its task handle lives here. If the owning future
/// is dropped before `execute` (outer timeout, runtime shutdown), `Drop`
/// spawns a background task that waits for that apply to return and only
/// then destroys.
struct ReleaseAction {
    provisioner: Arc<dyn Provisioner>,
    config: Arc<StackConfiguration>,
    apply: Option<ApplyTask>,
    armed: bool,
}

impl ReleaseAction {
    fn arm(provisioner: Arc<dyn Provisioner>, config: Arc<StackConfiguration>) -> Self {
        Self {
            provisioner,
            config,
            apply: None,
            armed: true,
        }
    }

    async fn execute(mut self) -> Result<()> {
        self.armed = false;
        if let Some(apply) = self.apply.take() {
            log_late_apply(join_outcome(apply.await));
        }
        destroy(&self.provisioner, &self.config).await
    }
}

impl Drop for ReleaseAction {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            root = %self.config.root.display(),
            "Lifecycle dropped before teardown, spawning best-effort destroy"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let provisioner = self.provisioner.clone();
                let config = self.config.clone();
                let apply = self.apply.take();
                handle.spawn(async move {
                    if let Some(apply) = apply {
                        info!("Waiting for in-flight apply before destroy");
                        log_late_apply(join_outcome(apply.await));
                    }
                    let _ = destroy(&provisioner, &config).await;
                });
            }
            Err(_) => error!(
                root = %self.config.root.display(),
                "No runtime available - run `terraform destroy` manually"
            ),
        }
    }
}

async fn destroy(provisioner: &Arc<dyn Provisioner>, config: &StackConfiguration) -> Result<()> {
    info!(root = %config.root.display(), "Destroying stack");
    match provisioner.destroy(config).await {
        Ok(_) => {
            info!(root = %config.root.display(), "Stack destroyed");
            Ok(())
        }
        Err(e) => {
            error!(
                root = %config.root.display(),
                error = %e,
                "Destroy failed - live resources may remain"
            );
            Err(e)
        }
    }
}

/// Flatten a joined apply task into the harness error model
fn join_outcome(joined: std::result::Result<Result<String>, JoinError>) -> Result<String> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(Error::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(Error::Interrupted(format!("apply task aborted: {e}"))),
    }
}

/// Report how an apply that nobody was waiting on ended
fn log_late_apply(outcome: Result<String>) -> Option<Error> {
    match outcome {
        Ok(_) => {
            warn!("Apply finished after the scenario stopped waiting");
            None
        }
        Err(e) => {
            error!(error = %e, "Apply failed after the scenario stopped waiting");
            Some(e)
        }
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one apply/assert/destroy cycle
pub struct LifecycleController {
    provisioner: Arc<dyn Provisioner>,
    shutdown: CancellationToken,
}

impl LifecycleController {
    /// Create a controller for a provisioner
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            shutdown: CancellationToken::new(),
        }
    }

    /// Observe an external interrupt signal
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Apply `config`, run `body` against the live stack, then destroy.
    ///
    /// Returns the body's value when everything succeeded. A destroy failure
    /// is returned as [`Error::Teardown`] wrapping any earlier scenario error.
    pub async fn run<T, F, Fut>(&self, config: Arc<StackConfiguration>, body: F) -> Result<T>
    where
        F: FnOnce(LiveStack) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.shutdown.is_cancelled() {
            return Err(Error::Interrupted("interrupted before provisioning".to_string()));
        }

        let mut release = ReleaseAction::arm(self.provisioner.clone(), config.clone());
        let outcome = self.provision_and_run(&mut release, &config, body).await;
        let destroyed = release.execute().await;

        match (outcome, destroyed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(d)) => Err(Error::Teardown {
                destroy: Box::new(d),
                scenario: None,
            }),
            (Err(e), Err(d)) => Err(Error::Teardown {
                destroy: Box::new(d),
                scenario: Some(Box::new(e)),
            }),
        }
    }

    fn spawn_apply(&self, config: &Arc<StackConfiguration>) -> ApplyTask {
        let provisioner = self.provisioner.clone();
        let config = config.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            provisioner.init(&config).await?;
            if shutdown.is_cancelled() {
                return Err(Error::Interrupted("interrupted after init".to_string()));
            }
            info!(root = %config.root.display(), "Applying stack");
            provisioner.apply(&config).await
        })
    }

    async fn provision_and_run<T, F, Fut>(
        &self,
        release: &mut ReleaseAction,
        config: &Arc<StackConfiguration>,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(LiveStack) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let apply = release.apply.insert(self.spawn_apply(config));

        let applied = tokio::select! {
            joined = &mut *apply => join_outcome(joined),
            _ = self.shutdown.cancelled() => {
                warn!("Interrupt received, waiting for terraform to return before destroy");
                let late = log_late_apply(join_outcome(apply.await));
                release.apply = None;
                return Err(Error::Interrupted(match late {
                    Some(e) => format!("interrupted during apply; apply then failed: {e}"),
                    None => "interrupted during apply".to_string(),
                }));
            }
        };
        release.apply = None;

        match applied {
            Ok(_) => info!(root = %config.root.display(), "Stack applied"),
            Err(e) => {
                error!(error = %e, "Provisioning failed");
                return Err(e);
            }
        }

        let live = LiveStack {
            provisioner: self.provisioner.clone(),
            config: config.clone(),
        };
        let body = AssertUnwindSafe(async move { body(live).await }).catch_unwind();

        tokio::select! {
            result = body => match result {
                Ok(result) => result,
                Err(panic) => Err(Error::Panicked(panic_message(panic))),
            },
            _ = self.shutdown.cancelled() => {
                warn!("Interrupt received while asserting, tearing down");
                Err(Error::Interrupted("interrupted during assertions".to_string()))
            }
        }
    }
}
