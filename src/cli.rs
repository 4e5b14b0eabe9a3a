//! Command-line surface
//!
//! ```text
//! stackcheck all        # fmt + validate, then gated lifecycle scenarios
//! stackcheck fmt        # format check only
//! stackcheck validate   # static validate only
//! stackcheck stack      # full-stack lifecycle (gated)
//! stackcheck function   # function module lifecycle (gated)
//! ```
//!
//! Lifecycle scenarios only run when `RUN_INTEGRATION_TESTS=true`;
//! `--skip-lifecycle` disables them regardless of the environment.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::assertions::{AssertionClient, AwsProbe};
use crate::config::{
    generate_run_id, load_vars_file, parse_var, VarValue, DEFAULT_REGION, DEFAULT_TERRAFORM_BIN,
};
use crate::gate::{RunGate, RUN_INTEGRATION_TESTS_ENV};
use crate::harness::RunSummary;
use crate::orchestrator::Orchestrator;
use crate::provisioner::TerraformCli;
use crate::scenarios::{Scenario, SuiteOptions};
use crate::Result;

/// stackcheck - integration tests for the site infrastructure
#[derive(Parser, Debug)]
#[command(name = "stackcheck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub suite: SuiteArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run every scenario
    All,
    /// Check formatting of the definition root
    Fmt,
    /// Statically validate the definition root
    Validate,
    /// Apply, verify and destroy the full stack
    Stack,
    /// Apply, verify and destroy the function module
    Function,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct SuiteArgs {
    /// Project directory containing `terraform/`
    #[arg(long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Main definition root (default: <project-dir>/terraform)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Function module root (default: <project-dir>/terraform/lambda)
    #[arg(long, global = true)]
    pub function_dir: Option<PathBuf>,

    /// Region for the stack and for live assertions
    #[arg(long, global = true, default_value = DEFAULT_REGION)]
    pub region: String,

    /// Input variable `key=value`, repeatable; overrides --vars-file
    #[arg(long = "var", global = true, value_parser = parse_var)]
    pub vars: Vec<(String, VarValue)>,

    /// JSON object of input variables
    #[arg(long, global = true)]
    pub vars_file: Option<PathBuf>,

    /// Provisioning binary
    #[arg(long, global = true, env = "STACKCHECK_TERRAFORM_BIN", default_value = DEFAULT_TERRAFORM_BIN)]
    pub terraform_bin: String,

    /// Run ID used to isolate working state (auto-generated if not provided)
    #[arg(long, global = true, env = "STACKCHECK_RUN_ID")]
    pub run_id: Option<String>,

    /// Never run lifecycle scenarios, whatever the environment says
    #[arg(long, global = true)]
    pub skip_lifecycle: bool,

    /// Keep colored tool output
    #[arg(long, global = true)]
    pub color: bool,
}

impl SuiteArgs {
    /// Resolve into suite options
    pub fn to_options(&self) -> Result<SuiteOptions> {
        let run_id = self.run_id.clone().unwrap_or_else(generate_run_id);
        let mut options = SuiteOptions::new(&self.project_dir, run_id);
        if let Some(ref dir) = self.dir {
            options.stack_dir = dir.clone();
        }
        if let Some(ref dir) = self.function_dir {
            options.function_dir = dir.clone();
        }
        options.region = self.region.clone();
        options.terraform_bin = self.terraform_bin.clone();
        options.no_color = !self.color;

        if let Some(ref path) = self.vars_file {
            options.extra_vars.extend(load_vars_file(path)?);
        }
        options.extra_vars.extend(self.vars.iter().cloned());
        Ok(options)
    }

    /// Gate decision source for this invocation
    pub fn run_gate(&self) -> RunGate {
        if self.skip_lifecycle {
            RunGate::disabled("--skip-lifecycle given")
        } else {
            RunGate::from_env(RUN_INTEGRATION_TESTS_ENV)
        }
    }
}

impl Commands {
    /// Scenarios selected by this command
    pub fn scenarios(&self, options: &SuiteOptions) -> Vec<Scenario> {
        match self {
            Commands::All => options.all(),
            Commands::Fmt => vec![options.format_scenario()],
            Commands::Validate => vec![options.validate_scenario()],
            Commands::Stack => vec![options.infrastructure_scenario()],
            Commands::Function => vec![options.function_scenario()],
        }
    }
}

impl Cli {
    /// Run the selected scenarios
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunSummary> {
        let options = self.suite.to_options()?;
        let scenarios = self.command.scenarios(&options);
        info!(
            run_id = %options.run_id,
            scenarios = scenarios.len(),
            "Starting stack checks"
        );

        let probe = AwsProbe::load(&options.region).await;
        let orchestrator =
            Orchestrator::new(Arc::new(TerraformCli::new()), AssertionClient::new(Arc::new(probe)))
                .with_gate(self.suite.run_gate())
                .with_shutdown(shutdown);

        Ok(orchestrator.run_all(&scenarios).await)
    }
}
