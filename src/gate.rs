//! Run gate for destructive scenarios
//!
//! Applying the stack creates real, billable infrastructure. The gate is
//! evaluated once at the start of a scenario and decides whether the full
//! apply/assert/destroy cycle runs at all.

use std::fmt;

/// Environment variable that opts in to the lifecycle scenarios
pub const RUN_INTEGRATION_TESTS_ENV: &str = "RUN_INTEGRATION_TESTS";

/// Decision for a destructive scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunGate {
    /// Run the full lifecycle
    Enabled,
    /// Cost/safety opt-out: the opt-in variable is not set to `true`
    DisabledByFlag {
        /// Variable that would enable the scenario
        variable: String,
    },
    /// Integration scenarios are disabled for this invocation
    DisabledUnconditionally {
        /// Who disabled it and why
        reason: String,
    },
}

impl RunGate {
    /// Evaluate the gate from the process environment
    pub fn from_env(variable: &str) -> Self {
        Self::from_lookup(variable, |name| std::env::var(name).ok())
    }

    /// Evaluate the gate with a custom variable lookup
    ///
    /// Only the exact value `true` opens the gate.
    pub fn from_lookup<F>(variable: &str, lookup: F) -> Self
    where
        F: FnOnce(&str) -> Option<String>,
    {
        match lookup(variable).as_deref() {
            Some("true") => RunGate::Enabled,
            _ => RunGate::DisabledByFlag {
                variable: variable.to_string(),
            },
        }
    }

    /// Gate that is closed regardless of the environment
    pub fn disabled(reason: impl Into<String>) -> Self {
        RunGate::DisabledUnconditionally {
            reason: reason.into(),
        }
    }

    /// True when the lifecycle may run
    pub fn is_open(&self) -> bool {
        matches!(self, RunGate::Enabled)
    }

    /// Skip reason for a closed gate, `None` when open
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            RunGate::Enabled => None,
            RunGate::DisabledByFlag { variable } => Some(SkipReason::OptOut {
                variable: variable.clone(),
            }),
            RunGate::DisabledUnconditionally { reason } => Some(SkipReason::Disabled {
                reason: reason.clone(),
            }),
        }
    }
}

/// Why a scenario was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Opt-in variable not set
    OptOut {
        /// Variable to set to `true`
        variable: String,
    },
    /// Explicitly disabled
    Disabled {
        /// Free-form reason
        reason: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OptOut { variable } => write!(
                f,
                "integration test skipped - set {}=true to enable",
                variable
            ),
            SkipReason::Disabled { reason } => {
                write!(f, "integration test disabled: {}", reason)
            }
        }
    }
}
