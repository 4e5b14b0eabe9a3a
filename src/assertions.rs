//! Live resource assertions
//!
//! These checks ask the cloud provider's control plane directly, independent
//! of the provisioning tool's state. A "not found" answer is a failed
//! assertion; any other provider or network error leaves existence unknown
//! and is reported as inconclusive rather than absent.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::{Error, Result};

/// Kinds of resources the harness can check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Object storage bucket (S3)
    StorageBucket,
    /// Managed key-value table (DynamoDB)
    Table,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StorageBucket => "S3 bucket",
            Self::Table => "DynamoDB table",
        };
        f.write_str(name)
    }
}

/// A (region, kind, identifier) predicate checked against the live provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAssertion {
    /// Provider region
    pub region: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Bucket or table name
    pub identifier: String,
}

impl ResourceAssertion {
    /// Assert a bucket exists
    pub fn bucket(region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            kind: ResourceKind::StorageBucket,
            identifier: name.into(),
        }
    }

    /// Assert a table exists
    pub fn table(region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            kind: ResourceKind::Table,
            identifier: name.into(),
        }
    }

    fn inconclusive(&self, message: impl Into<String>) -> Error {
        Error::AssertionInconclusive {
            kind: self.kind,
            identifier: self.identifier.clone(),
            region: self.region.clone(),
            message: message.into(),
        }
    }
}

/// Control-plane existence queries, one per resource kind
///
/// `Ok(false)` means the provider positively answered "not found". Every
/// other failure must be returned as `Err`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Does the bucket exist in the region?
    async fn bucket_exists(&self, region: &str, name: &str) -> Result<bool>;

    /// Does the table exist in the region?
    async fn table_exists(&self, region: &str, name: &str) -> Result<bool>;
}

/// Asserts resource existence through a [`ResourceProbe`]
#[derive(Clone)]
pub struct AssertionClient {
    probe: Arc<dyn ResourceProbe>,
}

impl AssertionClient {
    /// Wrap a probe
    pub fn new(probe: Arc<dyn ResourceProbe>) -> Self {
        Self { probe }
    }

    /// Raw existence query for one resource
    pub async fn exists(&self, region: &str, kind: ResourceKind, identifier: &str) -> Result<bool> {
        match kind {
            ResourceKind::StorageBucket => self.probe.bucket_exists(region, identifier).await,
            ResourceKind::Table => self.probe.table_exists(region, identifier).await,
        }
    }

    /// Fail unless the resource exists
    ///
    /// Probe errors become [`Error::AssertionInconclusive`]; a negative
    /// answer becomes [`Error::AssertionFailed`].
    pub async fn assert_exists(&self, assertion: &ResourceAssertion) -> Result<()> {
        let found = match self
            .exists(&assertion.region, assertion.kind, &assertion.identifier)
            .await
        {
            Ok(found) => found,
            Err(e @ Error::AssertionInconclusive { .. }) => return Err(e),
            Err(e) => return Err(assertion.inconclusive(e.to_string())),
        };

        if !found {
            return Err(Error::AssertionFailed {
                kind: assertion.kind,
                identifier: assertion.identifier.clone(),
                region: assertion.region.clone(),
            });
        }

        info!(
            kind = %assertion.kind,
            identifier = %assertion.identifier,
            region = %assertion.region,
            "Resource exists"
        );
        Ok(())
    }
}

// =============================================================================
// AWS Implementation
// =============================================================================

/// Probe backed by the AWS SDK
///
/// Credentials come from the standard AWS chain (environment, profile,
/// instance metadata). The region of each query overrides the default.
#[derive(Clone)]
pub struct AwsProbe {
    sdk_config: aws_config::SdkConfig,
}

impl AwsProbe {
    /// Load shared AWS configuration with a default region
    pub async fn load(default_region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(default_region.to_string()))
            .load()
            .await;
        Self { sdk_config }
    }

    fn s3_client(&self, region: &str) -> aws_sdk_s3::Client {
        let config = aws_sdk_s3::config::Builder::from(&self.sdk_config)
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    fn dynamodb_client(&self, region: &str) -> aws_sdk_dynamodb::Client {
        let config = aws_sdk_dynamodb::config::Builder::from(&self.sdk_config)
            .region(aws_sdk_dynamodb::config::Region::new(region.to_string()))
            .build();
        aws_sdk_dynamodb::Client::from_conf(config)
    }
}

#[async_trait]
impl ResourceProbe for AwsProbe {
    async fn bucket_exists(&self, region: &str, name: &str) -> Result<bool> {
        debug!(bucket = %name, region = %region, "HeadBucket");
        match self.s3_client(region).head_bucket().bucket(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(ResourceAssertion::bucket(region, name)
                        .inconclusive(DisplayErrorContext(&err).to_string()))
                }
            }
        }
    }

    async fn table_exists(&self, region: &str, name: &str) -> Result<bool> {
        debug!(table = %name, region = %region, "DescribeTable");
        match self
            .dynamodb_client(region)
            .describe_table()
            .table_name(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_resource_not_found_exception() {
                    Ok(false)
                } else {
                    Err(ResourceAssertion::table(region, name)
                        .inconclusive(DisplayErrorContext(&err).to_string()))
                }
            }
        }
    }
}
