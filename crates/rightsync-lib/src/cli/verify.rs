use crate::cli::VerifyParams;
use crate::download::{DownloadError, Target, select_target};
use crate::error::RightSyncError;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;

const CHECKING_PARALLELISM: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentStatus {
    Present(PathBuf),
    Missing(PathBuf),
    Conflicting,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub attachments: Vec<(String, AttachmentStatus)>,
}

impl VerifyReport {
    fn count(&self, predicate: impl Fn(&AttachmentStatus) -> bool) -> usize {
        self.attachments
            .iter()
            .filter(|(_, status)| predicate(status))
            .count()
    }

    pub fn missing(&self) -> usize {
        self.count(|status| matches!(status, AttachmentStatus::Missing(_)))
    }

    pub fn conflicting(&self) -> usize {
        self.count(|status| matches!(status, AttachmentStatus::Conflicting))
    }
}

/// Runs the dedup scan for every attachment without touching the network.
pub async fn check_attachments(params: &VerifyParams) -> Result<VerifyReport, RightSyncError> {
    let items = params.manifest.download_items(&params.output_dir)?;

    let statuses = stream::iter(items.iter())
        .map(|item| async move {
            match select_target(item).await {
                Ok(Target::Present(location)) => Ok(AttachmentStatus::Present(location)),
                Ok(Target::Free(location)) => Ok(AttachmentStatus::Missing(location)),
                Err(DownloadError::Conflict { .. }) => Ok(AttachmentStatus::Conflicting),
                Err(err) => Err(err),
            }
        })
        .buffered(CHECKING_PARALLELISM)
        .collect::<Vec<_>>()
        .await;

    let mut report = VerifyReport::default();
    for (attachment, status) in params.manifest.attachments.iter().zip(statuses) {
        let status =
            status.map_err(|e| eyre::eyre!("Failed to check {}: {}", attachment.name, e))?;
        report.attachments.push((attachment.name.clone(), status));
    }
    Ok(report)
}

pub async fn run_verify(params: VerifyParams) -> Result<VerifyReport, RightSyncError> {
    tracing::info!(
        "Checking {} attachments in {}",
        params.manifest.attachments.len(),
        params.output_dir.display()
    );

    let report = check_attachments(&params).await?;
    for (name, status) in &report.attachments {
        match status {
            AttachmentStatus::Present(location) => {
                tracing::info!("OK       {} ({})", name, location.display())
            }
            AttachmentStatus::Missing(location) => {
                tracing::warn!("MISSING  {} ({})", name, location.display())
            }
            AttachmentStatus::Conflicting => {
                tracing::warn!("CONFLICT {} (every location holds different content)", name)
            }
        }
    }

    let (missing, conflicting) = (report.missing(), report.conflicting());
    if missing > 0 || conflicting > 0 {
        return Err(RightSyncError::AttachmentVerification {
            missing,
            conflicting,
        });
    }

    tracing::info!("All attachments are up to date");
    Ok(report)
}
