mod error;
mod fetch;
mod manager;
mod types;

pub use error::{BatchError, DownloadError};
pub use fetch::{Fetch, HttpFetcher, Target, select_target};
pub use manager::DownloadManager;
pub use types::{DownloadItem, DownloadOptions};
