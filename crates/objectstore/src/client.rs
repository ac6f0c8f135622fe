use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use aws_sdk_s3::{
    config::{
        retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Credentials, Region,
    },
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use bytes::Bytes;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use intake_core::sanitize_filename;

/// Prefix under which every uploaded resume is stored.
pub const RESUME_PREFIX: &str = "resumes";

/// Region in which buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Settings required to reach an S3-compatible object store.
#[derive(Clone)]
pub struct ObjectStoreConfig {
    /// `host[:port][/path]` of the store; a leading scheme is ignored.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Selects `https` over `http` for requests and returned locators.
    pub secure: bool,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("secure", &self.secure)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Where an uploaded resume ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub locator: String,
}

/// Client for uploading resumes into a single bucket.
///
/// Clones share the set of buckets already verified to exist, so the
/// existence probe runs once per bucket for the lifetime of the process.
#[derive(Clone)]
pub struct ObjectStoreClient {
    s3: Client,
    base_url: Url,
    bucket: String,
    region: String,
    verified_buckets: Arc<Mutex<HashSet<String>>>,
}

impl ObjectStoreClient {
    pub fn new(config: ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        let endpoint = strip_scheme(&config.endpoint);
        if endpoint.is_empty() {
            return Err(ObjectStoreError::Config("endpoint must not be empty".to_string()));
        }
        let bucket = config.bucket.trim().to_string();
        if bucket.is_empty() {
            return Err(ObjectStoreError::Config("bucket must not be empty".to_string()));
        }

        let scheme = if config.secure { "https" } else { "http" };
        let base_url = Url::parse(&format!("{scheme}://{endpoint}"))?;

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(base_url.as_str().trim_end_matches('/'))
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                config.access_key,
                config.secret_key,
                None,
                None,
                "intake-config",
            ))
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(config.connect_timeout)
                    .operation_timeout(config.timeout)
                    .build(),
            )
            .build();

        Ok(Self {
            s3: Client::from_conf(s3_config),
            base_url,
            bucket,
            region: config.region,
            verified_buckets: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Stores a resume under a collision-free key.
    ///
    /// The key has the shape `resumes/{token}_{filename}` where the token is a
    /// fresh UUID, so repeated uploads of the same filename never overwrite
    /// each other.
    pub async fn upload(
        &self,
        payload: Bytes,
        filename: &str,
    ) -> Result<StoredObject, ObjectStoreError> {
        self.ensure_bucket(&self.bucket).await?;

        let key = object_key(filename);
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|err| request_error("put object", err))?;

        let locator = self.locator(&key);
        Ok(StoredObject { key, locator })
    }

    /// Removes a previously uploaded object from the configured bucket.
    pub async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| request_error("delete object", err))?;
        Ok(())
    }

    /// Makes sure the bucket exists, creating it on first use.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        if self.is_verified(bucket) {
            return Ok(());
        }

        match self.s3.head_bucket().bucket(bucket).send().await {
            Ok(_) => {}
            Err(err) if status_of(&err) == Some(404) => self.create_bucket(bucket).await?,
            Err(err) => return Err(request_error("head bucket", err)),
        }

        self.verified_buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bucket.to_string());
        Ok(())
    }

    /// Builds the directly addressable URL for a stored key.
    ///
    /// Each path segment is percent-encoded, so the locator stays parseable
    /// whatever characters the original filename carried.
    pub fn locator(&self, key: &str) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.bucket)
                .extend(key.split('/'));
        }
        url.to_string()
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        let mut request = self.s3.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            // another writer may have created it between probe and create
            Err(err) if status_of(&err) == Some(409) => Ok(()),
            Err(err) => Err(request_error("create bucket", err)),
        }
    }

    fn is_verified(&self, bucket: &str) -> bool {
        self.verified_buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(bucket)
    }
}

/// Generates `resumes/{token}_{filename}` for a client supplied filename.
pub fn object_key(filename: &str) -> String {
    format!(
        "{RESUME_PREFIX}/{}_{}",
        Uuid::new_v4().simple(),
        sanitize_filename(filename)
    )
}

fn strip_scheme(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// Errors produced by the object store client.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object store configuration: {0}")]
    Config(String),
    #[error("invalid object store endpoint: {0}")]
    Url(#[from] url::ParseError),
    #[error("{operation} rejected with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response()
        .map(|response| response.status().as_u16())
}

fn request_error<E>(operation: &'static str, err: SdkError<E>) -> ObjectStoreError
where
    E: std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match status_of(&err) {
        Some(status) => ObjectStoreError::Status {
            operation,
            status,
            message,
        },
        None => ObjectStoreError::Transport { operation, message },
    }
}
