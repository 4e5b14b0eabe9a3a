//! Provisioning tool seam
//!
//! The harness treats the provisioning tool as a black box with five
//! operations plus an output query. [`Provisioner`] abstracts those calls for
//! testability; [`TerraformCli`] drives the real `terraform` binary.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::StackConfiguration;
use crate::{Error, Result};

/// Trait for the provisioning tool's CLI surface
///
/// Every call blocks until the tool exits and returns its captured stdout on
/// success. There is no timeout here: apply and destroy legitimately take
/// many minutes, and a hang is surfaced by whatever encloses the run.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Check formatting without rewriting files
    async fn fmt_check(&self, config: &StackConfiguration) -> Result<String>;

    /// Static validation, no variables, no backend
    async fn validate(&self, config: &StackConfiguration) -> Result<String>;

    /// Initialise working state for the configuration
    async fn init(&self, config: &StackConfiguration) -> Result<String>;

    /// Create or update the live resources
    async fn apply(&self, config: &StackConfiguration) -> Result<String>;

    /// Tear down everything the configuration created
    async fn destroy(&self, config: &StackConfiguration) -> Result<String>;

    /// All recorded outputs, rendered as strings
    async fn outputs(&self, config: &StackConfiguration) -> Result<BTreeMap<String, String>>;
}

// =============================================================================
// Argument construction
// =============================================================================

fn with_color_flag(mut args: Vec<String>, config: &StackConfiguration) -> Vec<String> {
    if config.no_color {
        args.push("-no-color".to_string());
    }
    args
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// `fmt -check -recursive`
pub fn fmt_check_args(config: &StackConfiguration) -> Vec<String> {
    with_color_flag(to_args(&["fmt", "-check", "-recursive"]), config)
}

/// `init -input=false`, optionally without configuring the backend
pub fn init_args(config: &StackConfiguration, backend: bool) -> Vec<String> {
    let mut args = to_args(&["init", "-input=false"]);
    if !backend {
        args.push("-backend=false".to_string());
    }
    with_color_flag(args, config)
}

/// `validate`
pub fn validate_args(config: &StackConfiguration) -> Vec<String> {
    with_color_flag(to_args(&["validate"]), config)
}

/// `apply -auto-approve -input=false -var ...`
pub fn apply_args(config: &StackConfiguration) -> Vec<String> {
    let mut args = with_color_flag(to_args(&["apply", "-auto-approve", "-input=false"]), config);
    args.extend(config.var_args());
    args
}

/// `destroy -auto-approve -input=false -var ...`
pub fn destroy_args(config: &StackConfiguration) -> Vec<String> {
    let mut args = with_color_flag(
        to_args(&["destroy", "-auto-approve", "-input=false"]),
        config,
    );
    args.extend(config.var_args());
    args
}

/// `output -json`
pub fn output_args(config: &StackConfiguration) -> Vec<String> {
    with_color_flag(to_args(&["output", "-json"]), config)
}

// =============================================================================
// Output parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct OutputEntry {
    value: serde_json::Value,
}

/// Parse `terraform output -json` into name -> string value.
///
/// Strings are returned as-is, other values as compact JSON. Null values
/// are dropped so they read as missing.
pub fn parse_outputs(json: &str) -> Result<BTreeMap<String, String>> {
    if json.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .filter_map(|(name, entry)| match entry.value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((name, s)),
            other => Some((name, other.to_string())),
        })
        .collect())
}

// =============================================================================
// Real Implementation
// =============================================================================

/// Captured result of one tool invocation
#[derive(Debug)]
struct ToolOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl ToolOutput {
    /// stdout and stderr joined, whichever are non-empty
    fn diagnostics(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Provisioner that shells out to `terraform`
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformCli;

impl TerraformCli {
    /// Create a new CLI driver
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        config: &StackConfiguration,
        operation: &'static str,
        args: Vec<String>,
    ) -> Result<ToolOutput> {
        info!(
            root = %config.root.display(),
            "Running {} {}",
            config.terraform_bin,
            operation
        );
        let start = Instant::now();

        let mut cmd = Command::new(&config.terraform_bin);
        cmd.args(&args)
            .current_dir(&config.root)
            .env("TF_IN_AUTOMATION", "1");

        if let Some(ref data_dir) = config.data_dir {
            std::fs::create_dir_all(data_dir).map_err(|e| {
                Error::provisioning(
                    operation,
                    format!("failed to create data dir {}: {}", data_dir.display(), e),
                )
            })?;
            cmd.env("TF_DATA_DIR", data_dir);
        }

        // Reads are safe to abandon; apply/destroy must run to completion.
        if operation == "output" {
            cmd.kill_on_drop(true);
        }

        let output = cmd.output().await.map_err(|e| {
            Error::provisioning(
                operation,
                format!("failed to run {}: {}", config.terraform_bin, e),
            )
        })?;

        let result = ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(
            operation,
            success = result.success,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "terraform finished"
        );
        Ok(result)
    }

    async fn run_checked(
        &self,
        config: &StackConfiguration,
        operation: &'static str,
        args: Vec<String>,
    ) -> Result<String> {
        let output = self.run(config, operation, args).await?;
        if !output.success {
            return Err(Error::provisioning(operation, output.diagnostics()));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn fmt_check(&self, config: &StackConfiguration) -> Result<String> {
        let output = self.run(config, "fmt", fmt_check_args(config)).await?;
        if !output.success {
            // stdout lists the files that would be rewritten
            return Err(Error::static_validation(
                "fmt -check",
                format!("files need formatting:\n{}", output.diagnostics()),
            ));
        }
        Ok(output.stdout)
    }

    async fn validate(&self, config: &StackConfiguration) -> Result<String> {
        let init = self.run(config, "init", init_args(config, false)).await?;
        if !init.success {
            return Err(Error::static_validation("validate", init.diagnostics()));
        }
        let output = self.run(config, "validate", validate_args(config)).await?;
        if !output.success {
            return Err(Error::static_validation("validate", output.diagnostics()));
        }
        Ok(output.stdout)
    }

    async fn init(&self, config: &StackConfiguration) -> Result<String> {
        self.run_checked(config, "init", init_args(config, true))
            .await
    }

    async fn apply(&self, config: &StackConfiguration) -> Result<String> {
        self.run_checked(config, "apply", apply_args(config)).await
    }

    async fn destroy(&self, config: &StackConfiguration) -> Result<String> {
        self.run_checked(config, "destroy", destroy_args(config))
            .await
    }

    async fn outputs(&self, config: &StackConfiguration) -> Result<BTreeMap<String, String>> {
        let stdout = self
            .run_checked(config, "output", output_args(config))
            .await?;
        parse_outputs(&stdout)
    }
}
