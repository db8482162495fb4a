use std::path::{Path, PathBuf};

use anyhow::Context;
use shared::IdentityToken;
use thiserror::Error;
use tracing::info;

use crate::locator::ResourceLocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("report image has not finished loading")]
    NotLoaded,
}

pub fn download_file_name(token: &IdentityToken) -> String {
    format!("{token}的学习旅程.png")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadAction {
    pub file_name: String,
    pub locator: ResourceLocator,
    pub bytes: Vec<u8>,
}

impl DownloadAction {
    pub fn new(token: &IdentityToken, locator: ResourceLocator, bytes: Vec<u8>) -> Self {
        Self {
            file_name: download_file_name(token),
            locator,
            bytes,
        }
    }

    pub async fn save_into(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create download dir '{}'", dir.display()))?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes)
            .await
            .with_context(|| format!("failed to write report to '{}'", path.display()))?;
        info!(path = %path.display(), size_bytes = self.bytes.len(), "download: report saved");
        Ok(path)
    }
}
