use anyhow::{anyhow, Result};
use async_trait::async_trait;

pub mod config;
pub mod download;
pub mod fetcher;
pub mod http;
pub mod locator;
pub mod session;
pub mod view;

pub use config::{load_settings, ClientSettings};
pub use download::{download_file_name, DownloadAction, DownloadError};
pub use fetcher::{FetchEffect, FetchState, ReportFetcher, RetryPolicy, MAX_RETRIES, TOTAL_ATTEMPTS};
pub use http::{HttpImageLoader, HttpNetworkProbe};
pub use locator::{derive_locator, ReportOrigin, ResourceLocator};
pub use session::{DispatchError, ReportSession, SessionCommand, SessionHandle, SessionSnapshot};
pub use view::{key_action, KeyAction, KeyInput, ViewController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Resolves one locator into image bytes. Each call reports exactly one
/// outcome; callers supersede a request by dropping or aborting its future.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, locator: &ResourceLocator) -> Result<LoadedImage>;
}

/// Best-effort connectivity hints. Results only enrich user notices.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn is_online(&self) -> bool;
    async fn probe_origin(&self) -> Result<()>;
}

pub struct MissingImageLoader;

#[async_trait]
impl ImageLoader for MissingImageLoader {
    async fn load(&self, locator: &ResourceLocator) -> Result<LoadedImage> {
        Err(anyhow!("no image loader configured for {locator}"))
    }
}

pub struct AssumeOnline;

#[async_trait]
impl NetworkProbe for AssumeOnline {
    async fn is_online(&self) -> bool {
        true
    }

    async fn probe_origin(&self) -> Result<()> {
        Ok(())
    }
}
