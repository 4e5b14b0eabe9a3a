//! Error types for the stack harness

use thiserror::Error;

use crate::assertions::ResourceKind;

/// Main error type for harness operations
///
/// Every variant aborts only the scenario that produced it. None of them
/// suppresses the paired destroy for resources that scenario created.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Format check or static validate reported a problem
    #[error("{check} failed: {diagnostics}")]
    StaticValidation {
        /// Which static check failed ("fmt -check" or "validate")
        check: &'static str,
        /// Diagnostic text captured from the provisioning tool
        diagnostics: String,
    },

    /// init, apply, destroy or output query returned non-success
    #[error("terraform {operation} failed: {message}")]
    Provisioning {
        /// Tool subcommand that failed
        operation: &'static str,
        /// Captured stderr (or spawn error)
        message: String,
    },

    /// A required output is absent or empty after a successful apply
    #[error("output '{name}' missing: {reason}")]
    OutputMissing {
        /// Output name that was queried
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// An output value did not match its expected pattern
    #[error("output '{name}' = '{value}' does not contain '{expected}'")]
    OutputCheck {
        /// Output name
        name: String,
        /// Realized value
        value: String,
        /// Pattern the value must contain
        expected: String,
    },

    /// The live provider reports the resource does not exist
    #[error("{kind} '{identifier}' not found in {region}")]
    AssertionFailed {
        /// Kind of resource checked
        kind: ResourceKind,
        /// Resource identifier (bucket name, table name)
        identifier: String,
        /// Provider region queried
        region: String,
    },

    /// The provider could not answer; existence is unknown
    #[error("existence of {kind} '{identifier}' in {region} is inconclusive: {message}")]
    AssertionInconclusive {
        /// Kind of resource checked
        kind: ResourceKind,
        /// Resource identifier
        identifier: String,
        /// Provider region queried
        region: String,
        /// Provider/network error text
        message: String,
    },

    /// Destroy failed after the scenario finished
    #[error("{}", teardown_message(.destroy, .scenario))]
    Teardown {
        /// The destroy failure
        destroy: Box<Error>,
        /// The scenario failure that preceded destroy, if any
        scenario: Option<Box<Error>>,
    },

    /// The run was interrupted before the scenario completed
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// Scenario code panicked
    #[error("panic: {0}")]
    Panicked(String),

    /// Invalid harness configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or process spawn error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON from the tool or a vars file
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn teardown_message(destroy: &Error, scenario: &Option<Box<Error>>) -> String {
    match scenario {
        Some(scenario) => format!("{scenario}; additionally destroy failed: {destroy}"),
        None => format!("destroy failed: {destroy}"),
    }
}

impl Error {
    /// Create a provisioning error for the given tool operation
    pub fn provisioning(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Provisioning {
            operation,
            message: message.into(),
        }
    }

    /// Create a static validation error
    pub fn static_validation(check: &'static str, diagnostics: impl Into<String>) -> Self {
        Self::StaticValidation {
            check,
            diagnostics: diagnostics.into(),
        }
    }

    /// Create an output-missing error
    pub fn output_missing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OutputMissing {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for "resource absent" and "resource state unknown"
    pub fn is_assertion_failure(&self) -> bool {
        matches!(
            self,
            Self::AssertionFailed { .. } | Self::AssertionInconclusive { .. }
        )
    }

    /// The error that made the scenario fail, looking through a teardown wrapper
    pub fn scenario_error(&self) -> &Error {
        match self {
            Self::Teardown {
                scenario: Some(inner),
                ..
            } => inner,
            other => other,
        }
    }
}
