//! S3 object store backend
//!
//! This module provides [`S3Store`], a bucket handle over any S3-compatible
//! service:
//! - Bucket creation with the "already owned by you" answer kept structured
//! - Object reads with `NoSuchKey` mapped to a not-found error
//! - Buffered create-or-overwrite writes finalized with a single PutObject
//! - Owner identity enforced through the expected bucket owner header

use aws_sdk_s3::{
    error::{DisplayErrorContext, SdkError},
    operation::get_object::GetObjectOutput,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;

use crate::error::{StorageError, StorageResult};
use crate::storage::storage_api::{ObjectReader, ObjectStore, ObjectWriter};
use bytes::Bytes;

/// Region in which S3 rejects an explicit location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// S3 storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde_support", serde(default))]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// S3 endpoint URL (for S3-compatible services)
    pub endpoint_url: Option<String>,
    /// AWS access key ID (optional, can use IAM roles)
    pub access_key_id: Option<String>,
    /// AWS secret access key (optional, can use IAM roles)
    pub secret_access_key: Option<String>,
    /// Account that must own the bucket for object requests to succeed
    pub expected_bucket_owner: Option<String>,
    /// Enable path-style addressing
    pub path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            expected_bucket_owner: None,
            path_style: false,
        }
    }
}

/// Handle to one S3 bucket
#[derive(Debug, Clone)]
pub struct S3Store {
    client: S3Client,
    config: S3Config,
}

impl S3Store {
    /// Build the SDK client for `config`.
    ///
    /// Credentials are resolved here, so a process without usable
    /// credentials fails at start-up rather than on its first request.
    pub async fn connect(config: S3Config) -> StorageResult<Self> {
        if config.region.trim().is_empty() {
            return Err(StorageError::ConnectionError {
                reason: "no region configured for S3 client".to_string(),
            });
        }

        let aws_config = Self::build_aws_config(&config).await;
        let provider = aws_config
            .credentials_provider()
            .ok_or_else(|| StorageError::ConnectionError {
                reason: "no credentials provider available for S3 client".to_string(),
            })?;
        provider
            .provide_credentials()
            .await
            .map_err(|e| StorageError::ConnectionError {
                reason: format!("failed to resolve S3 credentials: {}", DisplayErrorContext(&e)),
            })?;

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.path_style)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            config,
        })
    }

    /// Configuration this handle was built from
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Build AWS configuration
    async fn build_aws_config(config: &S3Config) -> aws_config::SdkConfig {
        let mut builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        // Set credentials if provided
        if let (Some(access_key), Some(secret_key)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "acme-bucket-cache",
            ));
        }

        // Set custom endpoint if provided
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        builder.load().await
    }

    fn location_constraint(&self) -> Option<CreateBucketConfiguration> {
        if self.config.region == DEFAULT_REGION {
            return None;
        }

        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.config.region.as_str()))
                .build(),
        )
    }

    fn failed<E, R>(operation: &str, err: SdkError<E, R>) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        StorageError::operation_failed(operation, err)
    }
}

impl ObjectStore for S3Store {
    type Reader = S3Reader;
    type Writer = S3Writer;

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// S3 derives bucket ownership from the request credentials, so `owner`
    /// is enforced afterwards through `expected_bucket_owner` on object calls.
    async fn create_bucket(&self, _owner: &str) -> StorageResult<()> {
        match self
            .client
            .create_bucket()
            .bucket(&self.config.bucket)
            .set_create_bucket_configuration(self.location_constraint())
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(ref service_err)) if service_err.err().is_bucket_already_owned_by_you() => {
                Err(StorageError::BucketAlreadyOwned {
                    bucket: self.config.bucket.clone(),
                })
            }
            Err(SdkError::ServiceError(ref service_err)) if service_err.err().is_bucket_already_exists() => {
                Err(StorageError::BucketAlreadyExists {
                    bucket: self.config.bucket.clone(),
                })
            }
            Err(e) => Err(Self::failed("create_bucket", e)),
        }
    }

    async fn open_reader(&self, key: &str) -> StorageResult<S3Reader> {
        let output = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .set_expected_bucket_owner(self.config.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref service_err) if service_err.err().is_no_such_key() => {
                    StorageError::ObjectNotFound {
                        bucket: self.config.bucket.clone(),
                        key: key.to_string(),
                    }
                }
                _ => Self::failed("get_object", e),
            })?;

        Ok(S3Reader { output })
    }

    fn open_writer(&self, key: &str) -> S3Writer {
        S3Writer {
            client: self.client.clone(),
            bucket: self.config.bucket.clone(),
            key: key.to_string(),
            expected_bucket_owner: self.config.expected_bucket_owner.clone(),
            buffer: Vec::new(),
        }
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .set_expected_bucket_owner(self.config.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|e| Self::failed("delete_object", e))?;

        Ok(())
    }
}

/// Opened S3 object
#[derive(Debug)]
pub struct S3Reader {
    output: GetObjectOutput,
}

impl ObjectReader for S3Reader {
    async fn read_all(self) -> StorageResult<Bytes> {
        let data = self
            .output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::operation_failed("read_object_body", e))?;

        Ok(data.into_bytes())
    }
}

/// Pending S3 object, uploaded with PutObject on close
#[derive(Debug)]
pub struct S3Writer {
    client: S3Client,
    bucket: String,
    key: String,
    expected_bucket_owner: Option<String>,
    buffer: Vec<u8>,
}

impl ObjectWriter for S3Writer {
    async fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    async fn close(self) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .set_expected_bucket_owner(self.expected_bucket_owner)
            .body(ByteStream::from(self.buffer))
            .send()
            .await
            .map_err(|e| S3Store::failed("put_object", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_config_default() {
        let config = S3Config::default();
        assert_eq!(config.region, "us-east-1");
        assert!(config.bucket.is_empty());
        assert!(config.expected_bucket_owner.is_none());
        assert!(!config.path_style);
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_region() {
        let config = S3Config {
            bucket: "certs".to_string(),
            region: "  ".to_string(),
            ..Default::default()
        };

        let result = S3Store::connect(config).await;
        assert!(matches!(result, Err(StorageError::ConnectionError { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_static_credentials() {
        let config = S3Config {
            bucket: "certs".to_string(),
            region: "eu-west-1".to_string(),
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
            access_key_id: Some("test-access".to_string()),
            secret_access_key: Some("test-secret".to_string()),
            path_style: true,
            ..Default::default()
        };

        // No request is sent while building the client
        let store = S3Store::connect(config).await.unwrap();
        assert_eq!(store.bucket(), "certs");
        assert!(store.location_constraint().is_some());
    }

    #[tokio::test]
    async fn test_backend_error_kept_as_source() {
        use aws_sdk_s3::config::http::HttpResponse;
        use aws_sdk_s3::operation::get_object::GetObjectError;
        use std::error::Error as _;

        let config = S3Config {
            bucket: "certs".to_string(),
            endpoint_url: Some("http://127.0.0.1:1".to_string()),
            access_key_id: Some("test-access".to_string()),
            secret_access_key: Some("test-secret".to_string()),
            path_style: true,
            ..Default::default()
        };
        let store = S3Store::connect(config).await.unwrap();

        let err = store.open_reader("k").await.unwrap_err();
        assert!(matches!(err, StorageError::OperationFailed { ref operation, .. } if operation == "get_object"));

        let source = err.source().expect("backend error should be kept");
        let sdk_error = source
            .downcast_ref::<SdkError<GetObjectError, HttpResponse>>()
            .expect("source should be the SDK error itself");
        assert!(matches!(sdk_error, SdkError::DispatchFailure(_)));
    }
}
