//! stackcheck - integration-test harness for a Terraform-provisioned site stack
//!
//! The stack (bucket, distribution, HTTP gateway, key-value table, function
//! binding) is defined elsewhere. This crate drives the provisioning tool's
//! lifecycle against it and checks that what came out exists.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──> ValidationGate (fmt -check, validate)      always
//!      │
//!      └─ RunGate open? ──> LifecycleController
//!                             init ─> apply ─> body ─> destroy
//!                                              │
//!                                              ├─ OutputReader
//!                                              └─ AssertionClient ─> AWS
//! ```
//!
//! # Modules
//!
//! - [`provisioner`] - Tool seam ([`Provisioner`]) and the `terraform` CLI driver
//! - [`config`] - Per-scenario [`StackConfiguration`]
//! - [`gate`] - [`RunGate`] opt-in for destructive scenarios
//! - [`validation`] - Static, side-effect-free checks
//! - [`lifecycle`] - Apply/destroy pairing with guaranteed teardown
//! - [`outputs`] - Output reading and value checks
//! - [`assertions`] - Live resource existence checks
//! - [`scenarios`] - Built-in scenario set
//! - [`orchestrator`] - Runs scenarios and records outcomes
//! - [`harness`] - Pass/fail/skip reporting
//! - [`cli`] - Command-line surface
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod assertions;
#[allow(missing_docs)]
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod harness;
pub mod lifecycle;
pub mod orchestrator;
pub mod outputs;
pub mod provisioner;
pub mod scenarios;
pub mod validation;

pub use assertions::{AssertionClient, ResourceAssertion, ResourceKind, ResourceProbe};
pub use config::StackConfiguration;
pub use error::Error;
pub use gate::{RunGate, SkipReason};
pub use harness::{Outcome, RunSummary};
pub use lifecycle::{LifecycleController, LiveStack};
pub use outputs::{OutputReader, OutputSet};
pub use provisioner::{Provisioner, TerraformCli};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
