//! Object storage access for uploads, using Apache OpenDAL.
//!
//! Long-lived credentials stay on the server. Clients receive time-limited
//! signed URLs instead.
//!
//! # Architecture
//!
//! ```text
//! UploadSettings ──► resolve_storage_config ──► ClientFactory ──► ObjectTransport
//!   (snapshot)        (service binding, then        (OpenDAL S3)     put / delete /
//!                      UPLOAD_S3_* variables)                        presign
//!
//! make_key(filename, owner) ──► [owner/]segment/slug.ext
//!
//! UrlSigner::Direct ─ storage request signing (uploads, downloads without CDN)
//! UrlSigner::Cdn    ─ canned-policy edge signing (downloads with a distribution)
//! ```

mod cdn;
mod client;
mod config;
mod error;
mod key;
mod service;
mod signer;

pub use cdn::{CdnSigner, canned_policy};
pub use client::{
    ClientFactory, ObjectTransport, OpendalTransport, PutObjectOutput, S3ClientFactory,
    SignedRequest, build_operator,
};
pub use config::{
    PartialStorageConfig, SERVICE_BINDING_LABELS, SecretString, StorageConfig,
    ensure_object_storage, parse_service_binding, resolve_storage_config,
};
pub use error::StorageError;
pub use key::{ObjectKey, OwnerId, RANDOM_SEGMENT_LEN, make_key, slugify, split_filename};
pub use service::{DirectUpload, StorageService};
pub use signer::{PresignedUrl, SignOperation, UrlSigner};
