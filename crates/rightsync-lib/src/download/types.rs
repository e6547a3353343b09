use crate::verification::ContentDigest;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug)]
pub struct DownloadItem {
    pub source_url: Url,
    /// Acceptable destinations, in order of preference.
    pub candidate_locations: Vec<PathBuf>,
    pub expected_digest: ContentDigest,
    resolved_location: Option<PathBuf>,
    transferred_bytes: u64,
}

impl DownloadItem {
    pub fn new(
        source_url: Url,
        candidate_locations: Vec<PathBuf>,
        expected_digest: ContentDigest,
    ) -> Self {
        Self {
            source_url,
            candidate_locations,
            expected_digest,
            resolved_location: None,
            transferred_bytes: 0,
        }
    }

    /// Location the item was found at or written to, once it has resolved.
    pub fn resolved_location(&self) -> Option<&Path> {
        self.resolved_location.as_deref()
    }

    /// Bytes written for this item. Zero for items that were already present.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_location.is_some()
    }

    /// Records where the item ended up. Only the first resolution sticks.
    pub fn resolve(&mut self, location: PathBuf, transferred_bytes: u64) {
        if self.resolved_location.is_some() {
            tracing::warn!(
                url = %self.source_url,
                location = %location.display(),
                "Item already resolved, ignoring second resolution"
            );
            return;
        }
        self.resolved_location = Some(location);
        self.transferred_bytes = transferred_bytes;
    }
}

#[derive(Clone, Debug)]
pub struct DownloadOptions {
    pub max_in_flight: usize,
    pub max_attempts: usize,
    pub backoff_base: Duration,
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl DownloadOptions {
    /// Wait before attempt `attempt + 1` after attempt `attempt` (0-indexed) failed.
    ///
    /// The first retry waits `backoff_base` and each further retry doubles the wait
    /// (`base`, `2 * base`, `4 * base`, ...). The first attempt starts without waiting.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX).min(31);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            max_attempts: 10,
            backoff_base: Duration::from_millis(500),
            request_timeout: Some(Duration::from_secs(300)),
            user_agent: concat!("rightsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
