//! Storage core for Signpost.
//!
//! Brokers access to S3-compatible object storage: resolves credentials,
//! generates collision-resistant object keys and issues time-limited signed
//! URLs. No web dependencies; the HTTP surface belongs to the host application.
//!
//! # Modules
//!
//! - `storage` - Config resolution, key generation, URL signing, object operations

pub mod storage;
