//! Transport client construction.
//!
//! [`ObjectTransport`] is the capability the core needs from a provider: put,
//! delete and request signing. [`S3ClientFactory`] builds the OpenDAL-backed
//! implementation from a resolved [`StorageConfig`].

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use opendal::{Operator, services};

use super::config::StorageConfig;
use super::error::StorageError;

/// A signed provider request, as returned by the transport.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method the URL is valid for.
    pub method: String,
    /// The signed URL.
    pub uri: String,
    /// Headers the caller must send with the request.
    pub headers: HashMap<String, String>,
}

/// Provider acknowledgment of a direct upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Entity tag reported by the provider.
    pub etag: Option<String>,
    /// Object version, on versioned buckets.
    pub version: Option<String>,
    /// Bytes written.
    pub content_length: u64,
}

/// Object-storage capability consumed by the storage service.
pub trait ObjectTransport: Send + Sync {
    /// Store an object.
    fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<PutObjectOutput, StorageError>> + Send;

    /// Delete an object. Deleting a missing key is not an error.
    fn delete_object(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Sign a "put object" request.
    fn presign_put(
        &self,
        key: &str,
        content_type: Option<&str>,
        ttl: Duration,
    ) -> impl Future<Output = Result<SignedRequest, StorageError>> + Send;

    /// Sign a "get object" request.
    fn presign_get(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<SignedRequest, StorageError>> + Send;
}

/// Builds a transport client from resolved configuration.
pub trait ClientFactory: Send + Sync {
    /// Client type produced by this factory.
    type Client: ObjectTransport;

    /// Construct a client. Pure construction, no I/O.
    fn build_client(&self, config: &StorageConfig) -> Result<Self::Client, StorageError>;
}

/// Factory for OpenDAL S3 clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct S3ClientFactory;

impl ClientFactory for S3ClientFactory {
    type Client = OpendalTransport;

    fn build_client(&self, config: &StorageConfig) -> Result<Self::Client, StorageError> {
        build_operator(config).map(OpendalTransport::new)
    }
}

/// Create an OpenDAL S3 operator bound to the config's bucket and credentials.
///
/// Without an endpoint the operator targets AWS with virtual-hosted-style
/// addressing. With one, it targets that endpoint path-style, which MinIO and
/// most non-AWS providers require.
pub fn build_operator(config: &StorageConfig) -> Result<Operator, StorageError> {
    let builder = services::S3::default()
        .bucket(&config.bucket)
        .region(&config.region)
        .access_key_id(config.access_key.expose())
        .secret_access_key(config.secret_key.expose())
        .disable_config_load()
        .disable_ec2_metadata();

    let builder = match &config.endpoint {
        Some(endpoint) => builder.endpoint(endpoint),
        None => builder.enable_virtual_host_style(),
    };

    Ok(Operator::new(builder)
        .map_err(|e| StorageError::configuration(e.to_string()))?
        .finish())
}

/// [`ObjectTransport`] over an OpenDAL operator.
#[derive(Debug, Clone)]
pub struct OpendalTransport {
    operator: Operator,
}

impl OpendalTransport {
    /// Wrap an existing operator.
    #[must_use]
    pub fn new(operator: Operator) -> Self {
        Self { operator }
    }
}

impl ObjectTransport for OpendalTransport {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<PutObjectOutput, StorageError> {
        let content_length = body.len() as u64;
        let meta = self
            .operator
            .write_with(key, body)
            .content_type(content_type)
            .await?;

        Ok(PutObjectOutput {
            etag: meta.etag().map(str::to_owned),
            version: meta.version().map(str::to_owned),
            content_length,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.operator.delete(key).await.map_err(StorageError::from)
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: Option<&str>,
        ttl: Duration,
    ) -> Result<SignedRequest, StorageError> {
        let presigned = match content_type {
            Some(content_type) => {
                self.operator
                    .presign_write_with(key, ttl)
                    .content_type(content_type)
                    .await?
            }
            None => self.operator.presign_write(key, ttl).await?,
        };

        Ok(signed_request(&presigned))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<SignedRequest, StorageError> {
        let presigned = self.operator.presign_read(key, ttl).await?;
        Ok(signed_request(&presigned))
    }
}

fn signed_request(presigned: &opendal::raw::PresignedRequest) -> SignedRequest {
    let headers = presigned
        .header()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    SignedRequest {
        method: presigned.method().to_string(),
        uri: presigned.uri().to_string(),
        headers,
    }
}
