//! Bulk byte storage: EPUB uploads, chapter/chunk text, and audio fragments.
//! Keys are always produced by `crate::model::object_keys`; nothing here
//! builds a key string directly.

use crate::error::ObjectStoreError;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
}

impl S3Config {
    pub fn validate(&self) -> Result<(), ObjectStoreError> {
        if self.bucket_name.trim().is_empty() {
            return Err(ObjectStoreError::Config("bucket name cannot be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(ObjectStoreError::Config("region cannot be empty".into()));
        }
        if self.access_key_id.trim().is_empty() {
            return Err(ObjectStoreError::Config("access key id cannot be empty".into()));
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(ObjectStoreError::Config("secret access key cannot be empty".into()));
        }
        Ok(())
    }
}

/// Trait for bulk byte storage (allows mocking for tests).
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
    /// List keys with the given prefix, e.g. all audio fragments for a chapter.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket_name: String,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config) -> Result<Self, ObjectStoreError> {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "narrateforge-s3-config",
        );

        let mut builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        if let Some(endpoint) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        let aws_config = builder.load().await;
        let client = Client::new(&aws_config);

        Ok(Self {
            client,
            bucket_name: config.bucket_name,
        })
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), ObjectStoreError> {
        debug!(key, bytes = data.len(), "uploading object");
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(data.into())
            .send()
            .await
            .map_err(|e| ObjectStoreError::SdkError(format!("put_object failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        debug!(key, "downloading object");
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NoSuchKey") {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    ObjectStoreError::SdkError(format!("get_object failed: {msg}"))
                }
            })?;

        let data = response.body.collect().await?.into_bytes().to_vec();
        Ok(data)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        debug!(prefix, "listing objects");
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix);
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| ObjectStoreError::SdkError(format!("list_objects_v2 failed: {e}")))?;

            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if resp.is_truncated().unwrap_or(false) {
                continuation = resp.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(keys)
    }
}

/// In-memory object store used by unit and integration tests.
#[derive(Default, Clone)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
