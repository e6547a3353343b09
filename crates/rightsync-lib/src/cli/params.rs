use crate::download::DownloadOptions;
use crate::manifest::Manifest;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DownloadParams {
    pub manifest: Manifest,
    pub output_dir: PathBuf,
    pub options: DownloadOptions,
}

#[derive(Debug, Clone)]
pub struct VerifyParams {
    pub manifest: Manifest,
    pub output_dir: PathBuf,
}
