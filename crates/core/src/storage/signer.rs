//! URL signing strategies.
//!
//! Storage URLs are signed by the transport (request canonicalization with the
//! bucket's symmetric credentials). CDN-fronted deployments sign downloads at
//! the edge instead, so the origin endpoint never leaves the server.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cdn::CdnSigner;
use super::client::ObjectTransport;
use super::error::StorageError;
use super::key::ObjectKey;

/// Presigned URL for upload or download.
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUrl {
    /// Object key the URL grants access to.
    pub key: String,
    /// The presigned URL.
    pub url: String,
    /// HTTP method to use (PUT for upload, GET for download).
    pub method: String,
    /// Headers the request must carry.
    pub headers: HashMap<String, String>,
    /// When the URL expires.
    pub expires_at: DateTime<Utc>,
}

/// Operation a URL is signed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOperation<'a> {
    /// Upload, optionally pinned to a content type.
    Put {
        /// Content type the uploader must declare.
        content_type: Option<&'a str>,
    },
    /// Download.
    Get,
}

/// Signing strategy, chosen per call from configuration.
pub enum UrlSigner<T> {
    /// Storage request signing through the transport client.
    Direct(T),
    /// Edge signing with the distribution key pair.
    Cdn(CdnSigner),
}

impl<T: ObjectTransport> UrlSigner<T> {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Cdn(_) => "cdn",
        }
    }

    /// Sign `operation` on `key`, valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the signer fails, `Configuration` if the TTL is
    /// out of range or the CDN is asked to sign an upload.
    pub async fn sign(
        &self,
        operation: SignOperation<'_>,
        key: &ObjectKey,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let expires_at = expiry_from_now(ttl)?;

        match (self, operation) {
            (Self::Direct(client), SignOperation::Put { content_type }) => {
                let signed = client.presign_put(key.as_str(), content_type, ttl).await?;
                let mut headers = signed.headers;
                if let Some(content_type) = content_type {
                    headers
                        .entry("content-type".to_string())
                        .or_insert_with(|| content_type.to_string());
                }

                Ok(PresignedUrl {
                    key: key.to_string(),
                    url: signed.uri,
                    method: signed.method,
                    headers,
                    expires_at,
                })
            }
            (Self::Direct(client), SignOperation::Get) => {
                let signed = client.presign_get(key.as_str(), ttl).await?;
                Ok(PresignedUrl {
                    key: key.to_string(),
                    url: signed.uri,
                    method: signed.method,
                    headers: signed.headers,
                    expires_at,
                })
            }
            (Self::Cdn(cdn), SignOperation::Get) => Ok(PresignedUrl {
                key: key.to_string(),
                url: cdn.sign(key, expires_at)?,
                method: "GET".to_string(),
                headers: HashMap::new(),
                expires_at,
            }),
            (Self::Cdn(_), SignOperation::Put { .. }) => Err(StorageError::configuration(
                "CDN distribution cannot sign uploads",
            )),
        }
    }
}

/// Expiry instant for a URL signed now with `ttl`.
pub(crate) fn expiry_from_now(ttl: Duration) -> Result<DateTime<Utc>, StorageError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| StorageError::configuration(format!("presign TTL out of range: {ttl:?}")))
}
