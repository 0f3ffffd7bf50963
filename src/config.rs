//! Cache configuration
//!
//! [`CacheConfig`] collects what the embedding process hands to the cache at
//! start-up: bucket name, owner identity, S3 connection details and the retry
//! policy. It can be built in code or read from `CERT_CACHE_*` environment
//! variables.

use crate::error::{Error, Result};
use crate::storage::storage_api::RetryPolicy;
use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "s3")]
use crate::storage::storage_s3::S3Config;

/// Environment variable names read by [`CacheConfig::from_env`]
pub mod env {
    /// Bucket holding the cache entries (required)
    pub const BUCKET: &str = "CERT_CACHE_BUCKET";
    /// Owner identity for bucket creation
    pub const OWNER: &str = "CERT_CACHE_OWNER";
    /// Region of the bucket
    pub const REGION: &str = "CERT_CACHE_REGION";
    /// Region fallback shared with the AWS tooling
    pub const AWS_REGION: &str = "AWS_REGION";
    /// Endpoint of an S3-compatible service
    pub const ENDPOINT_URL: &str = "CERT_CACHE_ENDPOINT_URL";
    /// Use path-style addressing
    pub const PATH_STYLE: &str = "CERT_CACHE_PATH_STYLE";
    /// Additional attempts for transient failures
    pub const MAX_RETRIES: &str = "CERT_CACHE_MAX_RETRIES";
    /// Backoff before the first retry, in milliseconds
    pub const RETRY_BASE_DELAY_MS: &str = "CERT_CACHE_RETRY_BASE_DELAY_MS";
    /// Upper bound for one attempt, in milliseconds
    pub const ATTEMPT_TIMEOUT_MS: &str = "CERT_CACHE_ATTEMPT_TIMEOUT_MS";
}

/// Start-up configuration for a certificate cache
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    /// Bucket holding the cache entries
    pub bucket: String,
    /// Account or project the bucket is created under
    #[cfg_attr(feature = "serde_support", serde(default))]
    pub owner: String,
    /// Region of the bucket
    #[cfg_attr(feature = "serde_support", serde(default = "default_region"))]
    pub region: String,
    /// Endpoint of an S3-compatible service
    #[cfg_attr(feature = "serde_support", serde(default))]
    pub endpoint_url: Option<String>,
    /// Use path-style addressing
    #[cfg_attr(feature = "serde_support", serde(default))]
    pub path_style: bool,
    /// Retry policy applied at the cache boundary
    #[cfg_attr(feature = "serde_support", serde(default))]
    pub retry: RetryPolicy,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl CacheConfig {
    /// Configuration with defaults for everything but bucket and owner
    pub fn new(bucket: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            owner: owner.into(),
            region: default_region(),
            endpoint_url: None,
            path_style: false,
            retry: RetryPolicy::default(),
        }
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bucket = var(env::BUCKET).ok_or_else(|| Error::Configuration {
            message: format!("{} is not set", env::BUCKET),
        })?;

        let mut config = Self::new(bucket, var(env::OWNER).unwrap_or_default());

        if let Some(region) = var(env::REGION).or_else(|| var(env::AWS_REGION)) {
            config.region = region;
        }
        config.endpoint_url = var(env::ENDPOINT_URL);
        if let Some(value) = var(env::PATH_STYLE) {
            config.path_style = parse(env::PATH_STYLE, &value)?;
        }

        if let Some(value) = var(env::MAX_RETRIES) {
            config.retry.max_retries = parse(env::MAX_RETRIES, &value)?;
        }
        if let Some(value) = var(env::RETRY_BASE_DELAY_MS) {
            config.retry.base_delay = Duration::from_millis(parse(env::RETRY_BASE_DELAY_MS, &value)?);
        }
        if let Some(value) = var(env::ATTEMPT_TIMEOUT_MS) {
            config.retry.attempt_timeout = Some(Duration::from_millis(parse(env::ATTEMPT_TIMEOUT_MS, &value)?));
        }

        Ok(config)
    }

    /// S3 client configuration derived from this configuration
    #[cfg(feature = "s3")]
    pub fn s3_config(&self) -> S3Config {
        S3Config {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            expected_bucket_owner: (!self.owner.is_empty()).then(|| self.owner.clone()),
            path_style: self.path_style,
            ..Default::default()
        }
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| Error::Configuration {
        message: format!("invalid value {:?} for {}: {}", value, name, e),
    })
}
