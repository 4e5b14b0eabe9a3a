//! Output reading and value checks
//!
//! Outputs are only reachable through a live stack handle, so they can never
//! be queried before apply succeeded. A queried output that is absent or
//! empty is a failure, never a silent default.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::StackConfiguration;
use crate::provisioner::Provisioner;
use crate::{Error, Result};

/// Realized outputs of one apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSet {
    values: BTreeMap<String, String>,
}

impl OutputSet {
    /// Wrap raw name -> value pairs
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Value for `name`; absent or blank values are an error
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.values.get(name) {
            None => Err(Error::output_missing(name, "not recorded by terraform")),
            Some(value) if value.trim().is_empty() => {
                Err(Error::output_missing(name, "empty value"))
            }
            Some(value) => Ok(value.as_str()),
        }
    }

    /// Number of recorded outputs
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reads outputs of a live stack
#[derive(Clone)]
pub struct OutputReader {
    provisioner: Arc<dyn Provisioner>,
    config: Arc<StackConfiguration>,
}

impl OutputReader {
    pub(crate) fn new(provisioner: Arc<dyn Provisioner>, config: Arc<StackConfiguration>) -> Self {
        Self {
            provisioner,
            config,
        }
    }

    /// Read one output by name
    pub async fn read(&self, name: &str) -> Result<String> {
        let set = OutputSet::new(self.provisioner.outputs(&self.config).await?);
        let value = set.require(name)?;
        debug!(output = %name, value = %value, "Read output");
        Ok(value.to_string())
    }

    /// Read all outputs once and require every name in `names`
    pub async fn read_all(&self, names: &[&str]) -> Result<OutputSet> {
        let set = OutputSet::new(self.provisioner.outputs(&self.config).await?);
        for name in names {
            set.require(name)?;
        }
        Ok(set)
    }
}

/// Check applied to an output value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueCheck {
    /// Present and non-empty only
    NonEmpty,
    /// Must contain the given substring (e.g. a domain suffix)
    Contains(String),
}

impl ValueCheck {
    /// Evaluate the check against a realized value
    pub fn evaluate(&self, name: &str, value: &str) -> Result<()> {
        match self {
            ValueCheck::NonEmpty if value.trim().is_empty() => {
                Err(Error::output_missing(name, "empty value"))
            }
            ValueCheck::NonEmpty => Ok(()),
            ValueCheck::Contains(expected) if value.contains(expected.as_str()) => Ok(()),
            ValueCheck::Contains(expected) => Err(Error::OutputCheck {
                name: name.to_string(),
                value: value.to_string(),
                expected: expected.clone(),
            }),
        }
    }
}
