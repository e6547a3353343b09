use crate::download::DownloadItem;
use crate::error::RightSyncError;
use crate::verification::{ContentDigest, DigestAlgorithm};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestDigest {
    pub algorithm: DigestAlgorithm,
    pub value: String,
}

impl From<&ContentDigest> for ManifestDigest {
    fn from(digest: &ContentDigest) -> Self {
        Self {
            algorithm: digest.algorithm(),
            value: digest.to_hex(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestAttachment {
    /// Attachment file name as known to the remote API
    pub name: String,
    /// Complete download URL
    pub url: String,
    /// Acceptable local paths, relative ones are taken from the output directory
    pub locations: Vec<PathBuf>,
    /// Content digest published by the API
    pub digest: ManifestDigest,
}

/// Attachments referenced by a set of ServerTemplates and RightScripts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Version of the manifest format
    pub version: u32,
    pub attachments: Vec<ManifestAttachment>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            attachments: Vec::new(),
        }
    }

    pub fn add_attachment(
        &mut self,
        name: impl Into<String>,
        url: &Url,
        locations: Vec<PathBuf>,
        digest: &ContentDigest,
    ) {
        self.attachments.push(ManifestAttachment {
            name: name.into(),
            url: url.to_string(),
            locations,
            digest: ManifestDigest::from(digest),
        });
    }

    /// Builds one download item per attachment, rooting relative locations at `base_dir`.
    pub fn download_items(&self, base_dir: &Path) -> Result<Vec<DownloadItem>, RightSyncError> {
        let mut claimed = HashSet::new();
        let mut items = Vec::with_capacity(self.attachments.len());

        for attachment in &self.attachments {
            let source_url =
                Url::parse(&attachment.url).map_err(|e| RightSyncError::ManifestValidation {
                    details: format!(
                        "Invalid URL {} for attachment {}: {}",
                        attachment.url, attachment.name, e
                    ),
                })?;

            let expected_digest =
                ContentDigest::from_hex(attachment.digest.algorithm, &attachment.digest.value)?;

            if attachment.locations.is_empty() {
                return Err(RightSyncError::ManifestValidation {
                    details: format!("Attachment {} has no locations", attachment.name),
                });
            }

            let candidate_locations = attachment
                .locations
                .iter()
                .map(|location| base_dir.join(location))
                .collect::<Vec<_>>();

            for location in &candidate_locations {
                if !claimed.insert(location.clone()) {
                    return Err(RightSyncError::ManifestValidation {
                        details: format!(
                            "Location {} is claimed by more than one attachment",
                            location.display()
                        ),
                    });
                }
            }

            items.push(DownloadItem::new(
                source_url,
                candidate_locations,
                expected_digest,
            ));
        }

        Ok(items)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), RightSyncError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| RightSyncError::ManifestSave {
                path: path.to_path_buf(),
                reason: format!("JSON serialization failed: {}", e),
            })?;
        std::fs::write(path, json).map_err(|e| RightSyncError::ManifestSave {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, RightSyncError> {
        let content = std::fs::read_to_string(path).map_err(|e| RightSyncError::ManifestLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|e| RightSyncError::ManifestLoad {
                path: path.to_path_buf(),
                reason: format!("JSON parsing failed: {}", e),
            })?;

        if manifest.version != Self::VERSION {
            return Err(RightSyncError::ManifestValidation {
                details: format!(
                    "Manifest version {} is not supported. Expected version {}",
                    manifest.version,
                    Self::VERSION
                ),
            });
        }

        Ok(manifest)
    }
}
