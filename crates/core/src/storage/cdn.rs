//! CDN edge URL signing with canned policies.
//!
//! The policy `{"Statement":[{"Resource":URL,"Condition":{"DateLessThan":{"AWS:EpochTime":T}}}]}`
//! is signed with RSA-SHA1 (PKCS#1 v1.5) using the distribution's private key.
//! The signature travels in the query string with `Expires` and `Key-Pair-Id`.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha1::Sha1;
use signpost_shared::UploadSettings;
use url::Url;

use super::config::present;
use super::error::StorageError;
use super::key::ObjectKey;

/// Signs edge URLs for a CDN distribution.
#[derive(Clone)]
pub struct CdnSigner {
    domain: Url,
    key_pair_id: String,
    signing_key: SigningKey<Sha1>,
}

impl fmt::Debug for CdnSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnSigner")
            .field("domain", &self.domain.as_str())
            .field("key_pair_id", &self.key_pair_id)
            .finish_non_exhaustive()
    }
}

impl CdnSigner {
    /// Create a signer for `domain` (scheme optional, `https` assumed).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the domain is not a valid URL or the
    /// key is neither PKCS#1 nor PKCS#8 PEM.
    pub fn new(
        domain: &str,
        key_pair_id: impl Into<String>,
        private_key_pem: &str,
    ) -> Result<Self, StorageError> {
        let domain = parse_domain(domain)?;
        let private_key = parse_private_key(private_key_pem)?;

        Ok(Self {
            domain,
            key_pair_id: key_pair_id.into(),
            signing_key: SigningKey::<Sha1>::new(private_key),
        })
    }

    /// Build a signer when a distribution domain is configured.
    ///
    /// `Ok(None)` means no distribution: downloads go straight to storage.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the domain is set but the key-pair ID
    /// or private key is missing or unusable.
    pub fn from_settings(settings: &UploadSettings) -> Result<Option<Self>, StorageError> {
        let Some(domain) = present(settings.distribution_domain.clone()) else {
            return Ok(None);
        };

        let key_pair_id = present(settings.distribution_key_id.clone()).ok_or_else(|| {
            StorageError::configuration(
                "UPLOAD_DISTRIBUTION_DOMAIN is set but UPLOAD_DISTRIBUTION_KEY_ID is missing",
            )
        })?;
        let private_key = present(settings.distribution_key_contents.clone()).ok_or_else(|| {
            StorageError::configuration(
                "UPLOAD_DISTRIBUTION_DOMAIN is set but UPLOAD_DISTRIBUTION_KEY_CONTENTS is missing",
            )
        })?;

        Self::new(&domain, key_pair_id, &private_key).map(Some)
    }

    /// Edge URL for an object, before signing.
    ///
    /// Each `/`-separated segment of the key is percent-encoded, so `?`, `#`
    /// and `%` stay part of the object path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the key has `.` or `..` segments, which the edge
    /// would normalize onto a different object.
    pub fn resource_url(&self, key: &ObjectKey) -> Result<Url, StorageError> {
        if key.as_str().split('/').any(|segment| matches!(segment, "." | "..")) {
            return Err(StorageError::invalid_key(format!("{key} has dot segments")));
        }

        let mut url = self.domain.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| {
                StorageError::configuration(format!(
                    "distribution domain cannot carry a path: {}",
                    self.domain
                ))
            })?
            .pop_if_empty()
            .extend(key.as_str().split('/'));
        Ok(url)
    }

    /// Sign a download URL for `key`, valid until `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for keys with dot segments, or `Transport`
    /// if the RSA signature cannot be produced.
    pub fn sign(&self, key: &ObjectKey, expires_at: DateTime<Utc>) -> Result<String, StorageError> {
        let resource = self.resource_url(key)?;
        self.sign_url(&resource, expires_at)
    }

    /// Sign an arbitrary edge URL with a canned policy.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the RSA signature cannot be produced.
    pub fn sign_url(&self, resource: &Url, expires_at: DateTime<Utc>) -> Result<String, StorageError> {
        let epoch = expires_at.timestamp();
        let policy = canned_policy(resource.as_str(), epoch);

        let signature = self
            .signing_key
            .try_sign(policy.as_bytes())
            .map_err(|e| StorageError::transport(format!("CDN signing failed: {e}")))?;

        let separator = if resource.query().is_some() { '&' } else { '?' };
        Ok(format!(
            "{resource}{separator}Expires={epoch}&Signature={}&Key-Pair-Id={}",
            url_safe_base64(&signature.to_bytes()),
            self.key_pair_id
        ))
    }
}

/// Canned policy document for `resource`, expiring at `epoch`.
#[must_use]
pub fn canned_policy(resource: &str, epoch: i64) -> String {
    let resource = serde_json::Value::from(resource);
    format!(
        r#"{{"Statement":[{{"Resource":{resource},"Condition":{{"DateLessThan":{{"AWS:EpochTime":{epoch}}}}}}}]}}"#
    )
}

/// Base64 with the CDN's query-safe substitutions.
fn url_safe_base64(bytes: &[u8]) -> String {
    STANDARD
        .encode(bytes)
        .chars()
        .map(|c| match c {
            '+' => '-',
            '=' => '_',
            '/' => '~',
            c => c,
        })
        .collect()
}

fn parse_domain(domain: &str) -> Result<Url, StorageError> {
    let domain = domain.trim();
    let with_scheme = if domain.contains("://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| {
        StorageError::configuration(format!("invalid distribution domain {domain}: {e}"))
    })?;

    if url.host_str().is_none() {
        return Err(StorageError::configuration(format!(
            "distribution domain has no host: {domain}"
        )));
    }
    Ok(url)
}

/// Accept PKCS#1 or PKCS#8 PEM. Escaped `\n` sequences from env files are unfolded.
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, StorageError> {
    let pem = pem.trim().replace("\\n", "\n");

    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| StorageError::configuration(format!("invalid distribution private key: {e}")))
}
