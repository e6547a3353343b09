use crate::download::DownloadOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub download: DownloadConfig,
    pub output: OutputConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct DownloadConfig {
    pub max_in_flight: usize,
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
    /// Zero disables the per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        let options = DownloadOptions::default();
        Self {
            max_in_flight: options.max_in_flight,
            max_attempts: options.max_attempts,
            backoff_base_ms: options.backoff_base.as_millis() as u64,
            request_timeout_secs: options.request_timeout.map_or(0, |t| t.as_secs()),
        }
    }
}

impl DownloadConfig {
    pub fn to_options(&self) -> DownloadOptions {
        DownloadOptions {
            max_in_flight: self.max_in_flight,
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            request_timeout: (self.request_timeout_secs > 0)
                .then(|| Duration::from_secs(self.request_timeout_secs)),
            ..DownloadOptions::default()
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    /// Directory relative attachment locations are resolved against
    pub path: Option<PathBuf>,
}
