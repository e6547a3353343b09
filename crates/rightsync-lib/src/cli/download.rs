use crate::cli::DownloadParams;
use crate::download::DownloadManager;
use crate::error::RightSyncError;

pub async fn run_download(params: DownloadParams) -> Result<u64, RightSyncError> {
    let DownloadParams {
        manifest,
        output_dir,
        options,
    } = params;

    let mut items = manifest.download_items(&output_dir)?;
    tracing::info!(
        "Downloading {} attachments into {}",
        items.len(),
        output_dir.display()
    );

    let manager = DownloadManager::new(options)?;
    let result = manager.run(&mut items).await;

    for (attachment, item) in manifest.attachments.iter().zip(&items) {
        match item.resolved_location() {
            Some(location) if item.transferred_bytes() > 0 => tracing::info!(
                "Fetched {} -> {} ({} bytes)",
                attachment.name,
                location.display(),
                item.transferred_bytes()
            ),
            Some(location) => tracing::debug!(
                "Up to date {} at {}",
                attachment.name,
                location.display()
            ),
            None => tracing::debug!("Unresolved {}", attachment.name),
        }
    }

    let total_bytes = result?;
    tracing::info!("Download completed successfully");
    Ok(total_bytes)
}
