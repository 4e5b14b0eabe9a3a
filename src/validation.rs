//! Validation gate: static, side-effect-free checks
//!
//! Both checks are safe to run regardless of the run gate. They never call
//! apply or destroy and share no state, so running them twice against an
//! unchanged definition gives the same answer.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::StackConfiguration;
use crate::provisioner::Provisioner;
use crate::Result;

/// One of the two static checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticCheck {
    /// `fmt -check`
    Format,
    /// `validate` with no variables
    Validate,
}

impl fmt::Display for StaticCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticCheck::Format => f.write_str("format"),
            StaticCheck::Validate => f.write_str("validate"),
        }
    }
}

/// Runs the static checks against a definition root
#[derive(Clone)]
pub struct ValidationGate {
    provisioner: Arc<dyn Provisioner>,
}

impl ValidationGate {
    /// Create a gate for a provisioner
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner }
    }

    /// Run a single check
    pub async fn check(&self, check: StaticCheck, config: &StackConfiguration) -> Result<()> {
        match check {
            StaticCheck::Format => self.format_check(config).await,
            StaticCheck::Validate => self.validate(config).await,
        }
    }

    /// Fail if any file would be reformatted
    pub async fn format_check(&self, config: &StackConfiguration) -> Result<()> {
        self.provisioner.fmt_check(config).await?;
        info!(root = %config.root.display(), "Format check passed");
        Ok(())
    }

    /// Static validation with variables stripped
    pub async fn validate(&self, config: &StackConfiguration) -> Result<()> {
        self.provisioner.validate(&config.without_vars()).await?;
        info!(root = %config.root.display(), "Validate passed");
        Ok(())
    }
}
