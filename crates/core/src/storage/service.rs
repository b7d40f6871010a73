//! Storage service: the five operations exposed to the host application.

use std::time::Duration;

use serde::Serialize;
use signpost_shared::UploadSettings;
use tracing::{debug, info};

use super::cdn::CdnSigner;
use super::client::{ClientFactory, ObjectTransport, PutObjectOutput, S3ClientFactory};
use super::config::{StorageConfig, resolve_storage_config};
use super::error::StorageError;
use super::key::{ObjectKey, OwnerId, make_key};
use super::signer::{PresignedUrl, SignOperation, UrlSigner};

/// Result of a server-side upload.
#[derive(Debug, Clone, Serialize)]
pub struct DirectUpload {
    /// Generated object key.
    pub key: String,
    /// Entity tag reported by the provider.
    pub etag: Option<String>,
    /// Object version, on versioned buckets.
    pub version: Option<String>,
    /// Bytes written.
    pub content_length: u64,
}

impl DirectUpload {
    fn new(key: ObjectKey, response: PutObjectOutput) -> Self {
        Self {
            key: key.into_inner(),
            etag: response.etag,
            version: response.version,
            content_length: response.content_length,
        }
    }
}

/// Storage service for uploads, downloads and deletes.
///
/// Holds a settings snapshot, not a client: configuration is resolved and a
/// transport client built on every call, so calls share no mutable state.
pub struct StorageService<F: ClientFactory = S3ClientFactory> {
    settings: UploadSettings,
    factory: F,
    presign_ttl: Duration,
}

impl StorageService {
    /// Create a service backed by OpenDAL's S3 client.
    #[must_use]
    pub fn new(settings: UploadSettings) -> Self {
        Self::with_factory(settings, S3ClientFactory)
    }
}

impl<F: ClientFactory> StorageService<F> {
    /// Default presigned URL TTL: 1 hour.
    pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

    /// Create a service with a custom transport factory.
    #[must_use]
    pub fn with_factory(settings: UploadSettings, factory: F) -> Self {
        Self {
            settings,
            factory,
            presign_ttl: Self::DEFAULT_PRESIGN_TTL,
        }
    }

    /// Set the presigned URL TTL.
    #[must_use]
    pub fn with_presign_ttl(mut self, ttl: Duration) -> Self {
        self.presign_ttl = ttl;
        self
    }

    /// Presigned URL TTL.
    #[must_use]
    pub fn presign_ttl(&self) -> Duration {
        self.presign_ttl
    }

    /// Resolve the storage config from the settings snapshot.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the transport mode is wrong or
    /// required settings are missing.
    pub fn storage_config(&self) -> Result<StorageConfig, StorageError> {
        resolve_storage_config(&self.settings)
    }

    fn client(&self) -> Result<F::Client, StorageError> {
        let config = self.storage_config()?;
        debug!(bucket = %config.bucket, path_style = config.path_style(), "building storage client");
        self.factory.build_client(&config)
    }

    /// Generate a key for `filename` and a URL to upload it.
    ///
    /// The upload must declare `content_type`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error or the signer's transport error.
    pub async fn presign_upload(
        &self,
        filename: &str,
        content_type: &str,
        owner: Option<&OwnerId>,
    ) -> Result<PresignedUrl, StorageError> {
        let client = self.client()?;
        let key = make_key(filename, owner);

        let presigned = UrlSigner::Direct(client)
            .sign(
                SignOperation::Put {
                    content_type: Some(content_type),
                },
                &key,
                self.presign_ttl,
            )
            .await?;

        info!(key = %presigned.key, expires_at = %presigned.expires_at, "presigned upload");
        Ok(presigned)
    }

    /// Presign an upload to a key reserved earlier. Content type is not pinned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey`, a configuration error, or the signer's transport error.
    pub async fn presign_upload_for_key(&self, key: &str) -> Result<PresignedUrl, StorageError> {
        let key = ObjectKey::parse(key)?;
        let client = self.client()?;

        let presigned = UrlSigner::Direct(client)
            .sign(
                SignOperation::Put { content_type: None },
                &key,
                self.presign_ttl,
            )
            .await?;

        info!(key = %presigned.key, expires_at = %presigned.expires_at, "presigned upload for existing key");
        Ok(presigned)
    }

    /// Presign a download.
    ///
    /// With a CDN distribution configured the URL is edge-signed and points at
    /// the distribution; storage settings are not consulted. Otherwise it is a
    /// storage-signed URL for the bucket.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey`, a configuration error (including incomplete CDN
    /// settings), or the signer's transport error.
    pub async fn presign_download(&self, key: &str) -> Result<PresignedUrl, StorageError> {
        let key = ObjectKey::parse(key)?;

        let signer = match CdnSigner::from_settings(&self.settings)? {
            Some(cdn) => UrlSigner::Cdn(cdn),
            None => UrlSigner::Direct(self.client()?),
        };

        let presigned = signer
            .sign(SignOperation::Get, &key, self.presign_ttl)
            .await?;

        info!(
            key = %presigned.key,
            signer = signer.name(),
            expires_at = %presigned.expires_at,
            "presigned download"
        );
        Ok(presigned)
    }

    /// Upload bytes server-side under a freshly generated key.
    ///
    /// Keys from this path are never owner-scoped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error or the provider's transport error.
    pub async fn upload_direct(
        &self,
        body: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<DirectUpload, StorageError> {
        let client = self.client()?;
        let key = make_key(filename, None);

        let response = client.put_object(key.as_str(), body, content_type).await?;

        info!(key = %key, bytes = response.content_length, "uploaded object");
        Ok(DirectUpload::new(key, response))
    }

    /// Delete an object. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey`, a configuration error, or the provider's transport error.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = ObjectKey::parse(key)?;
        let client = self.client()?;

        client.delete_object(key.as_str()).await?;

        info!(key = %key, "deleted object");
        Ok(())
    }
}
