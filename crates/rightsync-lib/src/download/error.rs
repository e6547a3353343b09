use std::error::Error as _;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(
        "Conflicting files exist at every candidate location for {url}: {}",
        display_paths(.locations)
    )]
    Conflict { url: Url, locations: Vec<PathBuf> },

    #[error("Local environment error at {}: {source}", .path.display())]
    LocalEnvironment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    HttpStatus { url: Url, status: u16 },

    #[error("Transfer to {} failed: {source}", .path.display())]
    Transfer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Conflict { .. } | DownloadError::LocalEnvironment { .. } => false,
            DownloadError::Transport { source, .. } => is_transient_transport_error(source),
            DownloadError::HttpStatus { status, .. } => (500..600).contains(status),
            DownloadError::Transfer { .. } => true,
        }
    }
}

/// A download batch that stopped on a fatal error.
#[derive(Error, Debug)]
#[error("Download batch failed after transferring {transferred_bytes} bytes: {source}")]
pub struct BatchError {
    pub transferred_bytes: u64,
    #[source]
    pub source: DownloadError,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_transient_io_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::UnexpectedEof
    )
}

fn is_transient_transport_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }

    // reqwest wraps the underlying hyper/io errors; walk the chain for an io kind.
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
            && is_transient_io_kind(io_err.kind())
        {
            return true;
        }
        source = cause.source();
    }
    false
}
