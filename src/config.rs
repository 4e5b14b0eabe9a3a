//! Stack configuration handed to the provisioning tool.
//!
//! A [`StackConfiguration`] is built fresh for every scenario and never
//! mutated afterwards. Each one carries its own provisioning data directory
//! so that scenarios running in parallel processes never share lock or
//! module state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default provisioning binary
pub const DEFAULT_TERRAFORM_BIN: &str = "terraform";

/// Default AWS region for the stack and for live assertions
pub const DEFAULT_REGION: &str = "us-east-1";

/// A scalar input variable value.
///
/// Values are substituted verbatim into `-var key=value` arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    /// Boolean variable
    Bool(bool),
    /// Integer variable
    Int(i64),
    /// Floating point variable
    Float(f64),
    /// String variable
    String(String),
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{}", b),
            VarValue::Int(i) => write!(f, "{}", i),
            VarValue::Float(x) => write!(f, "{}", x),
            VarValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::String(s)
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        VarValue::Bool(b)
    }
}

impl From<i64> for VarValue {
    fn from(i: i64) -> Self {
        VarValue::Int(i)
    }
}

/// Identifies one infrastructure definition and how to drive it.
#[derive(Debug, Clone, PartialEq)]
pub struct StackConfiguration {
    /// Directory containing the `.tf` definition root
    pub root: PathBuf,
    /// Input variables passed to apply and destroy
    pub vars: BTreeMap<String, VarValue>,
    /// Pass `-no-color` to every tool invocation
    pub no_color: bool,
    /// Private `TF_DATA_DIR` for this configuration
    pub data_dir: Option<PathBuf>,
    /// Provisioning binary to execute
    pub terraform_bin: String,
}

impl StackConfiguration {
    /// Configuration for a definition root with no variables
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            vars: BTreeMap::new(),
            no_color: true,
            data_dir: None,
            terraform_bin: DEFAULT_TERRAFORM_BIN.to_string(),
        }
    }

    /// Add an input variable
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Add several input variables, overriding existing ones
    pub fn with_vars(mut self, vars: impl IntoIterator<Item = (String, VarValue)>) -> Self {
        self.vars.extend(vars);
        self
    }

    /// Set color handling
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Use an isolated data directory derived from a run id
    ///
    /// Format: `{tmp}/stackcheck-{run_id}-{label}`
    pub fn with_isolated_data_dir(mut self, run_id: &str, label: &str) -> Self {
        self.data_dir =
            Some(std::env::temp_dir().join(format!("stackcheck-{}-{}", run_id, label)));
        self
    }

    /// Override the provisioning binary
    pub fn with_terraform_bin(mut self, bin: impl Into<String>) -> Self {
        self.terraform_bin = bin.into();
        self
    }

    /// Strip the variables, as static validation requires
    pub fn without_vars(&self) -> Self {
        Self {
            vars: BTreeMap::new(),
            ..self.clone()
        }
    }

    /// Render variables as `-var key=value` argument pairs
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(k, v)| ["-var".to_string(), format!("{}={}", k, v)])
            .collect()
    }

    /// Variable as a string, if present
    pub fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).map(ToString::to_string)
    }
}

/// Parse a `key=value` pair from the command line.
///
/// Values are kept as strings; typed values come from a vars file.
pub fn parse_var(s: &str) -> Result<(String, VarValue)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| Error::config(format!("invalid variable '{}', expected key=value", s)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::config(format!("invalid variable '{}': empty name", s)));
    }
    Ok((key.to_string(), VarValue::String(value.to_string())))
}

/// Load variables from a JSON object file (`{"name": value, ...}`)
pub fn load_vars_file(path: &Path) -> Result<BTreeMap<String, VarValue>> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read vars file {}: {}", path.display(), e))
    })?;
    let vars: BTreeMap<String, VarValue> = serde_json::from_str(&data)?;
    Ok(vars)
}

/// Generate a short readable run ID (6 hex chars).
///
/// Used to name per-run provisioning data directories so parallel runs
/// never collide.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u32;
    let pid = std::process::id();
    format!("{:06x}", (timestamp ^ pid) & 0xFFFFFF)
}
