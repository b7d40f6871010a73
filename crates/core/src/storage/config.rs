//! Storage configuration resolution.
//!
//! Two sources can describe the bucket: a platform service-binding document
//! (`VCAP_SERVICES`) and the individual `UPLOAD_S3_*` variables. Each source
//! produces a [`PartialStorageConfig`]; partials are merged left to right with
//! the first non-empty value winning per field.

use std::fmt;

use serde::Deserialize;
use signpost_shared::{TransportMode, UploadSettings};
use tracing::{debug, warn};

use super::error::StorageError;

/// Service-binding labels searched for S3 credentials, in precedence order.
pub const SERVICE_BINDING_LABELS: [&str; 3] = ["aws-s3", "s3", "objectstore"];

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret for handing to a signer.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Fully resolved storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Bucket name.
    pub bucket: String,
    /// Bucket region.
    pub region: String,
    /// Access key ID.
    pub access_key: SecretString,
    /// Secret access key.
    pub secret_key: SecretString,
    /// Custom endpoint for S3-compatible providers.
    pub endpoint: Option<String>,
}

impl StorageConfig {
    /// Create a config targeting AWS S3.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            access_key: SecretString::new(access_key),
            secret_key: SecretString::new(secret_key),
            endpoint: None,
        }
    }

    /// Target a custom S3-compatible endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Custom endpoints are addressed path-style (`endpoint/bucket/key`).
    #[must_use]
    pub fn path_style(&self) -> bool {
        self.endpoint.is_some()
    }
}

/// Storage settings contributed by a single source.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PartialStorageConfig {
    /// Bucket name.
    pub bucket: Option<String>,
    /// Region.
    pub region: Option<String>,
    /// Access key ID.
    pub access_key: Option<String>,
    /// Secret access key.
    pub secret_key: Option<String>,
    /// Custom endpoint.
    pub endpoint: Option<String>,
}

impl fmt::Debug for PartialStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialStorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "[redacted]"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[redacted]"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl PartialStorageConfig {
    /// Read the individual `UPLOAD_S3_*` settings.
    #[must_use]
    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self {
            bucket: present(settings.s3_bucket.clone()),
            region: present(settings.s3_region.clone()),
            access_key: present(settings.s3_access_key.clone()),
            secret_key: present(settings.s3_secret_key.clone()),
            endpoint: present(settings.s3_endpoint.clone()),
        }
    }

    /// Merge with a lower-precedence source. Fields already set here win.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            bucket: self.bucket.or(fallback.bucket),
            region: self.region.or(fallback.region),
            access_key: self.access_key.or(fallback.access_key),
            secret_key: self.secret_key.or(fallback.secret_key),
            endpoint: self.endpoint.or(fallback.endpoint),
        }
    }

    /// Validate required fields and produce a usable config.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming every missing field.
    pub fn into_config(self) -> Result<StorageConfig, StorageError> {
        let mut missing = Vec::new();
        if self.bucket.is_none() {
            missing.push("bucket");
        }
        if self.region.is_none() {
            missing.push("region");
        }
        if self.access_key.is_none() {
            missing.push("access key");
        }
        if self.secret_key.is_none() {
            missing.push("secret key");
        }

        match (self.bucket, self.region, self.access_key, self.secret_key) {
            (Some(bucket), Some(region), Some(access_key), Some(secret_key)) => Ok(StorageConfig {
                bucket,
                region,
                access_key: SecretString::new(access_key),
                secret_key: SecretString::new(secret_key),
                endpoint: self.endpoint,
            }),
            _ => Err(StorageError::configuration(format!(
                "missing S3 credentials ({}): configure VCAP_SERVICES with an S3 service \
                 or set UPLOAD_S3_BUCKET, UPLOAD_S3_REGION, UPLOAD_S3_ACCESS_KEY and \
                 UPLOAD_S3_SECRET_KEY",
                missing.join(", ")
            ))),
        }
    }
}

/// Credential fields of a bound S3-class service.
#[derive(Debug, Deserialize)]
struct BindingCredentials {
    bucket_name: Option<String>,
    bucket: Option<String>,
    region: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    endpoint: Option<String>,
}

impl From<BindingCredentials> for PartialStorageConfig {
    fn from(creds: BindingCredentials) -> Self {
        Self {
            bucket: present(creds.bucket_name).or_else(|| present(creds.bucket)),
            region: present(creds.region),
            access_key: present(creds.access_key_id),
            secret_key: present(creds.secret_access_key),
            endpoint: present(creds.endpoint),
        }
    }
}

/// Extract S3 settings from a service-binding document.
///
/// The first label in [`SERVICE_BINDING_LABELS`] whose first instance carries a
/// `credentials` object wins. `Ok(None)` means the document is valid but binds
/// no S3-class service.
///
/// # Errors
///
/// Returns the JSON error if the document or the chosen credentials are malformed.
pub fn parse_service_binding(raw: &str) -> Result<Option<PartialStorageConfig>, serde_json::Error> {
    let document: serde_json::Value = serde_json::from_str(raw)?;

    for label in SERVICE_BINDING_LABELS {
        let credentials = document
            .get(label)
            .and_then(|instances| instances.get(0))
            .and_then(|instance| instance.get("credentials"))
            .filter(|credentials| credentials.is_object());

        if let Some(credentials) = credentials {
            let creds: BindingCredentials = serde_json::from_value(credentials.clone())?;
            debug!(label, "using S3 credentials from service binding");
            return Ok(Some(creds.into()));
        }
    }

    Ok(None)
}

/// Check that the host application routes uploads to object storage.
///
/// # Errors
///
/// Returns `InvalidTransport` for any other mode, including an unset one.
pub fn ensure_object_storage(settings: &UploadSettings) -> Result<(), StorageError> {
    match settings.transport_mode() {
        Some(Ok(TransportMode::S3)) => Ok(()),
        Some(Ok(mode)) => Err(StorageError::invalid_transport(mode.as_str())),
        Some(Err(_)) => Err(StorageError::invalid_transport(
            settings.transport.clone().unwrap_or_default(),
        )),
        None => Err(StorageError::invalid_transport("<unset>")),
    }
}

/// Resolve the storage config from a settings snapshot.
///
/// A malformed service binding is logged and ignored; resolution then falls
/// through to the individual variables.
///
/// # Errors
///
/// Returns `InvalidTransport` if uploads are not routed to object storage, or
/// `Configuration` if bucket, region, access key or secret key is missing.
pub fn resolve_storage_config(settings: &UploadSettings) -> Result<StorageConfig, StorageError> {
    ensure_object_storage(settings)?;

    let from_binding = settings
        .service_binding
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| match parse_service_binding(raw) {
            Ok(partial) => partial,
            Err(err) => {
                warn!(error = %err, "failed to parse service binding, ignoring it");
                None
            }
        });

    from_binding
        .unwrap_or_default()
        .or(PartialStorageConfig::from_settings(settings))
        .into_config()
}

/// Blank values count as absent.
pub(crate) fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const BINDING: &str = r#"{
        "s3": [{
            "name": "uploads",
            "credentials": {
                "bucket_name": "bound-bucket",
                "region": "eu-central-1",
                "access_key_id": "BOUNDKEY",
                "secret_access_key": "bound-secret",
                "endpoint": "https://objects.example.net"
            }
        }]
    }"#;

    fn settings(vars: &[(&str, &str)]) -> UploadSettings {
        UploadSettings::from_env_map(vars.iter().copied()).expect("valid settings")
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("UPLOAD_TRANSPORT", "s3"),
            ("UPLOAD_S3_BUCKET", "env-bucket"),
            ("UPLOAD_S3_REGION", "us-east-1"),
            ("UPLOAD_S3_ACCESS_KEY", "ENVKEY"),
            ("UPLOAD_S3_SECRET_KEY", "env-secret"),
        ]
    }

    #[test]
    fn test_resolve_from_service_binding_only() {
        let config = resolve_storage_config(&settings(&[
            ("UPLOAD_TRANSPORT", "s3"),
            ("VCAP_SERVICES", BINDING),
        ]))
        .expect("binding is complete");

        assert_eq!(config.bucket, "bound-bucket");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.access_key.expose(), "BOUNDKEY");
        assert_eq!(config.secret_key.expose(), "bound-secret");
        assert_eq!(
            config.endpoint.as_deref(),
            Some("https://objects.example.net")
        );
        assert!(config.path_style());
    }

    #[test]
    fn test_resolve_from_env_only() {
        let config = resolve_storage_config(&settings(&full_env())).expect("env is complete");

        assert_eq!(config.bucket, "env-bucket");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.access_key.expose(), "ENVKEY");
        assert_eq!(config.secret_key.expose(), "env-secret");
        assert!(config.endpoint.is_none());
        assert!(!config.path_style());
    }

    #[test]
    fn test_binding_wins_over_env() {
        let mut vars = full_env();
        vars.push(("VCAP_SERVICES", BINDING));

        let config = resolve_storage_config(&settings(&vars)).expect("complete");
        assert_eq!(config.bucket, "bound-bucket");
        assert_eq!(config.access_key.expose(), "BOUNDKEY");
    }

    #[test]
    fn test_env_fills_fields_missing_from_binding() {
        let binding = r#"{"aws-s3":[{"credentials":{"bucket":"bound","region":"ap-south-1","access_key_id":"K"}}]}"#;
        let config = resolve_storage_config(&settings(&[
            ("UPLOAD_TRANSPORT", "s3"),
            ("UPLOAD_S3_SECRET_KEY", "env-secret"),
            ("UPLOAD_S3_ENDPOINT", "http://localhost:9000"),
            ("VCAP_SERVICES", binding),
        ]))
        .expect("merged config is complete");

        assert_eq!(config.bucket, "bound");
        assert_eq!(config.secret_key.expose(), "env-secret");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_binding_missing_secret_fails() {
        let binding = r#"{"s3":[{"credentials":{"bucket_name":"b","region":"r","access_key_id":"k"}}]}"#;
        let err = resolve_storage_config(&settings(&[
            ("UPLOAD_TRANSPORT", "s3"),
            ("VCAP_SERVICES", binding),
        ]))
        .unwrap_err();

        assert!(matches!(err, StorageError::Configuration(_)));
        let msg = err.to_string();
        assert!(msg.contains("secret key"));
        assert!(msg.contains("VCAP_SERVICES"));
        assert!(msg.contains("UPLOAD_S3_SECRET_KEY"));
    }

    #[test]
    fn test_malformed_binding_falls_back_to_env() {
        let mut vars = full_env();
        vars.push(("VCAP_SERVICES", "{not json"));

        let config = resolve_storage_config(&settings(&vars)).expect("env is complete");
        assert_eq!(config.bucket, "env-bucket");
    }

    #[test]
    fn test_blank_env_values_are_absent() {
        let err = resolve_storage_config(&settings(&[
            ("UPLOAD_TRANSPORT", "s3"),
            ("UPLOAD_S3_BUCKET", "  "),
            ("UPLOAD_S3_REGION", "us-east-1"),
            ("UPLOAD_S3_ACCESS_KEY", "k"),
            ("UPLOAD_S3_SECRET_KEY", "s"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[rstest]
    #[case(&[("UPLOAD_TRANSPORT", "database")], "database")]
    #[case(&[("UPLOAD_TRANSPORT", "ftp")], "ftp")]
    #[case(&[], "<unset>")]
    fn test_transport_mode_mismatch(#[case] vars: &[(&str, &str)], #[case] mode: &str) {
        let err = resolve_storage_config(&settings(vars)).unwrap_err();
        match err {
            StorageError::InvalidTransport { mode: actual } => assert_eq!(actual, mode),
            other => panic!("expected InvalidTransport, got {other:?}"),
        }
    }

    #[rstest]
    #[case(r#"{"aws-s3":[{"credentials":{"bucket":"a"}}],"s3":[{"credentials":{"bucket":"b"}}]}"#, "a")]
    #[case(r#"{"s3":[{"credentials":{"bucket":"b"}}],"objectstore":[{"credentials":{"bucket":"c"}}]}"#, "b")]
    #[case(r#"{"objectstore":[{"credentials":{"bucket":"c"}}]}"#, "c")]
    #[case(r#"{"aws-s3":[],"objectstore":[{"credentials":{"bucket":"c"}}]}"#, "c")]
    fn test_service_binding_label_precedence(#[case] raw: &str, #[case] bucket: &str) {
        let partial = parse_service_binding(raw)
            .expect("valid json")
            .expect("has s3 entry");
        assert_eq!(partial.bucket.as_deref(), Some(bucket));
    }

    #[test]
    fn test_service_binding_prefers_bucket_name() {
        let raw = r#"{"s3":[{"credentials":{"bucket_name":"named","bucket":"plain"}}]}"#;
        let partial = parse_service_binding(raw).expect("valid").expect("entry");
        assert_eq!(partial.bucket.as_deref(), Some("named"));
    }

    #[test]
    fn test_service_binding_without_s3_entry() {
        let raw = r#"{"postgres":[{"credentials":{"uri":"postgres://"}}]}"#;
        assert_eq!(parse_service_binding(raw).expect("valid"), None);
    }

    #[test]
    fn test_service_binding_invalid_json() {
        assert!(parse_service_binding("[").is_err());
    }

    #[test]
    fn test_partial_merge_first_non_empty_wins() {
        let first = PartialStorageConfig {
            bucket: Some("first".into()),
            ..PartialStorageConfig::default()
        };
        let second = PartialStorageConfig {
            bucket: Some("second".into()),
            region: Some("r2".into()),
            ..PartialStorageConfig::default()
        };

        let merged = first.or(second);
        assert_eq!(merged.bucket.as_deref(), Some("first"));
        assert_eq!(merged.region.as_deref(), Some("r2"));
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config = StorageConfig::new("b", "r", "AKIAEXAMPLE", "topsecret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("topsecret"));
    }
}
