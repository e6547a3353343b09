use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RightSyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to load manifest from {path}: {reason}")]
    ManifestLoad { path: PathBuf, reason: String },

    #[error("Failed to save manifest to {path}: {reason}")]
    ManifestSave { path: PathBuf, reason: String },

    #[error("Manifest validation failed: {details}")]
    ManifestValidation { details: String },

    #[error("Invalid command line arguments: {details}")]
    CliArgumentValidation { details: String },

    #[error("Download failed: {0}")]
    Download(#[from] crate::download::BatchError),

    #[error("Attachment verification failed: {missing} missing, {conflicting} conflicting")]
    AttachmentVerification { missing: usize, conflicting: usize },

    #[error("Digest error: {0}")]
    Digest(#[from] crate::verification::VerificationError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] eyre::Report),
}
