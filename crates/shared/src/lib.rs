//! Upload settings and errors shared across Signpost crates.
//!
//! - Configuration surface read from the environment
//! - Application-wide error types

pub mod config;
pub mod error;

pub use config::{TransportMode, UploadSettings};
pub use error::{AppError, AppResult};
