use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};

/// StorageService
///
/// Object storage for user uploads (profile pictures). The S3 client is used at
/// runtime; `MockStorageService` keeps uploads in memory for tests.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if it does not exist. Only called locally.
    async fn ensure_bucket_exists(&self);

    /// Stores `body` under `key` and returns the key actually used.
    ///
    /// # Arguments
    /// * `key`: Object key (path + filename); traversal segments are stripped.
    /// * `content_type`: MIME type recorded with the object.
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<String, String>;

    /// Removes the object stored under `key`. Missing objects are not an error.
    async fn delete_object(&self, key: &str) -> Result<(), String>;
}

/// S3StorageClient
///
/// `StorageService` over the AWS SDK. Path-style addressing keeps it compatible
/// with MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket fails harmlessly when the bucket is already there.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = ?e, "create_bucket skipped");
        }
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<String, String> {
        let key = sanitize_key(key);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        tracing::info!(bucket = %self.bucket_name, key = %key, "stored upload");
        Ok(key)
    }

    async fn delete_object(&self, key: &str) -> Result<(), String> {
        let key = sanitize_key(key);

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        tracing::info!(bucket = %self.bucket_name, key = %key, "removed upload");
        Ok(())
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a client-influenced key cannot escape
/// its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// In-memory `StorageService` for tests. Stored objects can be inspected through
/// `stored_keys`.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every upload fails.
    pub should_fail: bool,
    objects: Arc<Mutex<Vec<(String, String, usize)>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.iter().map(|(key, _, _)| key.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }

        let key = sanitize_key(key);
        self.objects
            .lock()
            .map_err(|e| e.to_string())?
            .push((key.clone(), content_type.to_string(), body.len()));
        Ok(key)
    }

    async fn delete_object(&self, key: &str) -> Result<(), String> {
        let key = sanitize_key(key);
        self.objects
            .lock()
            .map_err(|e| e.to_string())?
            .retain(|(stored, _, _)| *stored != key);
        Ok(())
    }
}

/// StorageState
///
/// Shared handle to the storage service held in `AppState`.
pub type StorageState = Arc<dyn StorageService>;
