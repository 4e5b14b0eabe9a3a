//! Built-in scenarios for the site stack
//!
//! - `terraform_format` / `terraform_validate`: static checks of the main
//!   definition root, always run
//! - `terraform_infrastructure`: full stack (bucket, distribution, gateway,
//!   table), gated
//! - `terraform_function_module`: the function module and its submissions
//!   table, gated

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::assertions::{AssertionClient, ResourceAssertion, ResourceKind};
use crate::config::{StackConfiguration, VarValue, DEFAULT_REGION};
use crate::lifecycle::LiveStack;
use crate::outputs::ValueCheck;
use crate::validation::StaticCheck;
use crate::Result;

/// Generated bucket name for the static site
pub const OUTPUT_S3_BUCKET_NAME: &str = "s3_bucket_name";
/// Distribution id
pub const OUTPUT_CLOUDFRONT_DISTRIBUTION_ID: &str = "cloudfront_distribution_id";
/// Distribution domain
pub const OUTPUT_CLOUDFRONT_DOMAIN_NAME: &str = "cloudfront_domain_name";
/// Invoke URL of the HTTP gateway
pub const OUTPUT_API_GATEWAY_URL: &str = "api_gateway_url";
/// Key-value table of the main stack
pub const OUTPUT_DYNAMODB_TABLE_NAME: &str = "dynamodb_table_name";
/// Table written by the contact-form function
pub const OUTPUT_CONTACT_SUBMISSIONS_TABLE_NAME: &str = "contact_submissions_table_name";

/// Domain every distribution hostname lives under
pub const CLOUDFRONT_DOMAIN: &str = "cloudfront.net";
/// Domain every gateway invoke URL lives under
pub const AWS_DOMAIN: &str = "amazonaws.com";

/// What to check about one output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputExpectation {
    /// Output name
    pub name: &'static str,
    /// Value check
    pub check: ValueCheck,
    /// Live resource the value names, if any
    pub resource: Option<ResourceKind>,
}

impl OutputExpectation {
    /// Output must be present and non-empty
    pub fn non_empty(name: &'static str) -> Self {
        Self {
            name,
            check: ValueCheck::NonEmpty,
            resource: None,
        }
    }

    /// Output must contain `pattern`
    pub fn contains(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            check: ValueCheck::Contains(pattern.to_string()),
            resource: None,
        }
    }

    /// Output names a resource that must exist in the provider
    pub fn resource(name: &'static str, kind: ResourceKind) -> Self {
        Self {
            name,
            check: ValueCheck::NonEmpty,
            resource: Some(kind),
        }
    }
}

/// Expectations for the main stack
pub fn full_stack_expectations() -> Vec<OutputExpectation> {
    vec![
        OutputExpectation::resource(OUTPUT_S3_BUCKET_NAME, ResourceKind::StorageBucket),
        OutputExpectation::non_empty(OUTPUT_CLOUDFRONT_DISTRIBUTION_ID),
        OutputExpectation::contains(OUTPUT_CLOUDFRONT_DOMAIN_NAME, CLOUDFRONT_DOMAIN),
        OutputExpectation::contains(OUTPUT_API_GATEWAY_URL, AWS_DOMAIN),
        OutputExpectation::resource(OUTPUT_DYNAMODB_TABLE_NAME, ResourceKind::Table),
    ]
}

/// Expectations for the function module
pub fn function_module_expectations() -> Vec<OutputExpectation> {
    vec![OutputExpectation::resource(
        OUTPUT_CONTACT_SUBMISSIONS_TABLE_NAME,
        ResourceKind::Table,
    )]
}

/// Input variables for a test deployment of the main stack
pub fn default_stack_vars(region: &str) -> BTreeMap<String, VarValue> {
    BTreeMap::from([
        ("aws_region".to_string(), VarValue::from(region)),
        ("project_name".to_string(), VarValue::from("test-pipelines")),
        ("environment".to_string(), VarValue::from("test")),
        ("deployment_id".to_string(), VarValue::from("terratest")),
    ])
}

/// What a scenario does
#[derive(Debug, Clone)]
pub enum ScenarioKind {
    /// One static check, never gated
    Static(StaticCheck),
    /// Apply, check outputs and resources, destroy; gated
    Lifecycle {
        /// Region for live assertions
        region: String,
        /// Output checks run against the live stack
        expectations: Vec<OutputExpectation>,
    },
}

/// A named unit of work reported as pass/fail/skip
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Scenario name as reported
    pub name: String,
    /// Configuration, built fresh for this scenario
    pub config: Arc<StackConfiguration>,
    /// What to run
    pub kind: ScenarioKind,
}

impl Scenario {
    /// Static format check scenario
    pub fn format(config: StackConfiguration) -> Self {
        Self {
            name: "terraform_format".to_string(),
            config: Arc::new(config),
            kind: ScenarioKind::Static(StaticCheck::Format),
        }
    }

    /// Static validate scenario
    pub fn validate(config: StackConfiguration) -> Self {
        Self {
            name: "terraform_validate".to_string(),
            config: Arc::new(config),
            kind: ScenarioKind::Static(StaticCheck::Validate),
        }
    }

    /// Full-stack lifecycle scenario
    pub fn infrastructure(config: StackConfiguration, region: &str) -> Self {
        Self {
            name: "terraform_infrastructure".to_string(),
            config: Arc::new(config),
            kind: ScenarioKind::Lifecycle {
                region: region.to_string(),
                expectations: full_stack_expectations(),
            },
        }
    }

    /// Function module lifecycle scenario
    pub fn function_module(config: StackConfiguration, region: &str) -> Self {
        Self {
            name: "terraform_function_module".to_string(),
            config: Arc::new(config),
            kind: ScenarioKind::Lifecycle {
                region: region.to_string(),
                expectations: function_module_expectations(),
            },
        }
    }

    /// True when the scenario applies real infrastructure
    pub fn is_destructive(&self) -> bool {
        matches!(self.kind, ScenarioKind::Lifecycle { .. })
    }
}

/// Knobs shared by the built-in scenario set
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    /// Main definition root
    pub stack_dir: std::path::PathBuf,
    /// Function module root
    pub function_dir: std::path::PathBuf,
    /// Region for the stack and assertions
    pub region: String,
    /// Extra variables, overriding defaults
    pub extra_vars: BTreeMap<String, VarValue>,
    /// Run id used for isolated data dirs
    pub run_id: String,
    /// Provisioning binary
    pub terraform_bin: String,
    /// Pass -no-color
    pub no_color: bool,
}

impl SuiteOptions {
    /// Defaults relative to a project directory
    pub fn new(project_dir: &Path, run_id: impl Into<String>) -> Self {
        Self {
            stack_dir: project_dir.join("terraform"),
            function_dir: project_dir.join("terraform").join("lambda"),
            region: DEFAULT_REGION.to_string(),
            extra_vars: BTreeMap::new(),
            run_id: run_id.into(),
            terraform_bin: crate::config::DEFAULT_TERRAFORM_BIN.to_string(),
            no_color: true,
        }
    }

    fn base_config(&self, root: &Path, label: &str) -> StackConfiguration {
        StackConfiguration::new(root)
            .with_no_color(self.no_color)
            .with_terraform_bin(self.terraform_bin.clone())
            .with_isolated_data_dir(&self.run_id, label)
    }

    /// Format check of the main root
    pub fn format_scenario(&self) -> Scenario {
        Scenario::format(self.base_config(&self.stack_dir, "fmt"))
    }

    /// Validate of the main root
    pub fn validate_scenario(&self) -> Scenario {
        Scenario::validate(self.base_config(&self.stack_dir, "validate"))
    }

    /// Full-stack lifecycle with default and extra variables
    pub fn infrastructure_scenario(&self) -> Scenario {
        let config = self
            .base_config(&self.stack_dir, "stack")
            .with_vars(default_stack_vars(&self.region))
            .with_vars(self.extra_vars.clone());
        let region = config
            .var("aws_region")
            .unwrap_or_else(|| self.region.clone());
        Scenario::infrastructure(config, &region)
    }

    /// Function module lifecycle; only extra variables are passed
    pub fn function_scenario(&self) -> Scenario {
        let config = self
            .base_config(&self.function_dir, "function")
            .with_vars(self.extra_vars.clone());
        Scenario::function_module(config, &self.region)
    }

    /// Every built-in scenario in run order
    pub fn all(&self) -> Vec<Scenario> {
        vec![
            self.format_scenario(),
            self.validate_scenario(),
            self.infrastructure_scenario(),
            self.function_scenario(),
        ]
    }
}

/// Check every expectation against a live stack
///
/// Stops at the first failure; the controller tears the stack down either way.
pub async fn verify_stack(
    stack: &LiveStack,
    assertions: &AssertionClient,
    region: &str,
    expectations: &[OutputExpectation],
) -> Result<()> {
    let outputs = stack.outputs();
    for expectation in expectations {
        let value = outputs.read(expectation.name).await?;
        expectation.check.evaluate(expectation.name, &value)?;
        if let Some(kind) = expectation.resource {
            assertions
                .assert_exists(&ResourceAssertion {
                    region: region.to_string(),
                    kind,
                    identifier: value.clone(),
                })
                .await?;
        }
        info!(output = %expectation.name, value = %value, "Output verified");
    }
    Ok(())
}
