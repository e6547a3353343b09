use super::error::{BatchError, DownloadError};
use super::fetch::{Fetch, HttpFetcher};
use super::types::{DownloadItem, DownloadOptions};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct BatchState {
    total_bytes: u64,
    first_error: Option<DownloadError>,
}

/// Shared state for a single `run` invocation.
struct DownloadBatch {
    permits: Semaphore,
    state: Mutex<BatchState>,
}

impl DownloadBatch {
    fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Semaphore::new(max_in_flight.max(1)),
            state: Mutex::new(BatchState::default()),
        }
    }

    async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.permits.acquire().await.ok()
    }

    fn has_failed(&self) -> bool {
        self.state.lock().first_error.is_some()
    }

    fn record_success(&self, bytes: u64) {
        self.state.lock().total_bytes += bytes;
    }

    fn record_failure(&self, err: DownloadError) {
        let mut state = self.state.lock();
        if state.first_error.is_none() {
            state.first_error = Some(err);
        } else {
            debug!("Dropping error after batch already failed: {}", err);
        }
    }

    fn into_state(self) -> BatchState {
        self.state.into_inner()
    }
}

/// Downloads a batch of items with bounded parallelism and per-item retries.
pub struct DownloadManager<F = HttpFetcher> {
    fetcher: F,
    options: DownloadOptions,
}

impl DownloadManager<HttpFetcher> {
    pub fn new(options: DownloadOptions) -> Result<Self, reqwest::Error> {
        let fetcher = HttpFetcher::new(&options)?;
        Ok(Self::with_fetcher(fetcher, options))
    }
}

impl<F: Fetch> DownloadManager<F> {
    pub fn with_fetcher(fetcher: F, options: DownloadOptions) -> Self {
        Self { fetcher, options }
    }

    /// Resolves every item and returns the number of bytes written.
    ///
    /// Only the first fatal error of the batch is reported. Once it is recorded no
    /// item starts another attempt, but transfers already in flight are left to
    /// finish on their own.
    pub async fn run(&self, items: &mut [DownloadItem]) -> Result<u64, BatchError> {
        let started = Instant::now();
        let item_count = items.len();
        let batch = DownloadBatch::new(self.options.max_in_flight);

        let mut workers = items
            .iter_mut()
            .map(|item| self.run_item(&batch, item))
            .collect::<FuturesUnordered<_>>();
        while workers.next().await.is_some() {}
        drop(workers);

        let BatchState {
            total_bytes,
            first_error,
        } = batch.into_state();

        let elapsed = started.elapsed();
        let kilobytes = total_bytes as f64 / 1024.0;
        let seconds = elapsed.as_secs_f64();
        let throughput = if seconds > 0.0 { kilobytes / seconds } else { 0.0 };
        info!(
            "Downloaded {} items ({:.1} KB) in {:.2?} ({:.1} KB/s)",
            item_count, kilobytes, elapsed, throughput
        );

        match first_error {
            None => Ok(total_bytes),
            Some(source) => Err(BatchError {
                transferred_bytes: total_bytes,
                source,
            }),
        }
    }

    async fn run_item(&self, batch: &DownloadBatch, item: &mut DownloadItem) {
        let max_attempts = self.options.max_attempts;

        for attempt in 0..max_attempts {
            if attempt > 0 && batch.has_failed() {
                debug!(url = %item.source_url, attempt, "Batch already failed, giving up on item");
                return;
            }

            let result = {
                let Some(_permit) = batch.acquire().await else {
                    warn!(url = %item.source_url, "Download permit pool closed");
                    return;
                };
                self.fetcher.fetch(item).await
            };

            match result {
                Ok(()) => {
                    batch.record_success(item.transferred_bytes());
                    return;
                }
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.options.backoff(attempt);
                    warn!(
                        url = %item.source_url,
                        attempt = attempt + 1,
                        max_attempts,
                        "Download failed, retrying in {:?}: {}",
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(
                        url = %item.source_url,
                        attempt = attempt + 1,
                        "Download failed: {}",
                        err
                    );
                    batch.record_failure(err);
                    return;
                }
            }
        }
    }
}
