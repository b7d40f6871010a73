//! Signpost command line.
//!
//! Usage:
//!   signpost presign-upload <filename> --content-type <ct> [--owner <id>]
//!   signpost presign-upload-key <key>
//!   signpost presign-download <key>
//!   signpost upload <path> [--content-type <ct>]
//!   signpost delete <key>
//!
//! Results are printed to stdout as JSON. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signpost_core::storage::{OwnerId, StorageError, StorageService};
use signpost_shared::{AppError, UploadSettings};

/// Broker signed object-storage URLs.
#[derive(Debug, Parser)]
#[command(name = "signpost", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a key for a filename and presign its upload.
    PresignUpload {
        /// Filename the key is derived from.
        filename: String,
        /// Content type the upload must declare.
        #[arg(long)]
        content_type: String,
        /// Owner scope prepended to the key.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Presign an upload to an existing key.
    PresignUploadKey {
        /// Object key.
        key: String,
    },
    /// Presign a download.
    PresignDownload {
        /// Object key.
        key: String,
    },
    /// Upload a local file server-side.
    Upload {
        /// Local file path.
        path: PathBuf,
        /// Content type; guessed from the extension when omitted.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Delete an object.
    Delete {
        /// Object key.
        key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signpost=info,signpost_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let app_err = into_app_error(err);
            error!(code = app_err.error_code(), "{app_err}");
            eprintln!(
                "{:#}",
                json!({ "error": app_err.error_code(), "message": app_err.to_string() })
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<serde_json::Value> {
    let settings =
        UploadSettings::load().map_err(|e| AppError::Configuration(e.to_string()))?;
    let service = StorageService::new(settings);

    let output = match command {
        Command::PresignUpload {
            filename,
            content_type,
            owner,
        } => {
            let owner = owner.map(OwnerId::new);
            let presigned = service
                .presign_upload(&filename, &content_type, owner.as_ref())
                .await?;
            serde_json::to_value(presigned)?
        }
        Command::PresignUploadKey { key } => {
            serde_json::to_value(service.presign_upload_for_key(&key).await?)?
        }
        Command::PresignDownload { key } => {
            serde_json::to_value(service.presign_download(&key).await?)?
        }
        Command::Upload { path, content_type } => {
            let body = tokio::fs::read(&path).await?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow::anyhow!("not a file path: {}", path.display()))?;
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&path));

            info!(path = %path.display(), %content_type, "uploading file");
            serde_json::to_value(service.upload_direct(body, filename, &content_type).await?)?
        }
        Command::Delete { key } => {
            service.delete(&key).await?;
            json!({ "key": key, "deleted": true })
        }
    };

    Ok(output)
}

fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn into_app_error(err: anyhow::Error) -> AppError {
    let err = match err.downcast::<AppError>() {
        Ok(app) => return app,
        Err(err) => err,
    };
    let err = match err.downcast::<StorageError>() {
        Ok(storage) => return storage.into(),
        Err(err) => err,
    };
    match err.downcast::<std::io::Error>() {
        Ok(io) => AppError::Validation(io.to_string()),
        Err(err) => AppError::Internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_presign_upload() {
        let cli = Cli::try_parse_from([
            "signpost",
            "presign-upload",
            "report.PDF",
            "--content-type",
            "application/pdf",
            "--owner",
            "42",
        ])
        .expect("valid args");

        match cli.command {
            Command::PresignUpload {
                filename,
                content_type,
                owner,
            } => {
                assert_eq!(filename, "report.PDF");
                assert_eq!(content_type, "application/pdf");
                assert_eq!(owner.as_deref(), Some("42"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_presign_upload_requires_content_type() {
        assert!(Cli::try_parse_from(["signpost", "presign-upload", "a.txt"]).is_err());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("scan.pdf")), "application/pdf");
        assert_eq!(guess_content_type(Path::new("photo.PNG")), "image/png");
        assert_eq!(
            guess_content_type(Path::new("blob")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_into_app_error() {
        let err = into_app_error(StorageError::invalid_transport("database").into());
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");

        let err = into_app_error(StorageError::transport("denied").into());
        assert_eq!(err.error_code(), "EXTERNAL_SERVICE_ERROR");

        let err = into_app_error(AppError::Configuration("bad file".into()).into());
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");

        let err = into_app_error(anyhow::anyhow!("boom"));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }
}
