//! reqwest-backed collaborators for the report origin.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::{debug, info};

use crate::{
    locator::{ReportOrigin, ResourceLocator},
    ImageLoader, LoadedImage, NetworkProbe,
};

pub struct HttpImageLoader {
    http: Client,
}

impl HttpImageLoader {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for HttpImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, locator: &ResourceLocator) -> Result<LoadedImage> {
        debug!(locator = %locator, "http: requesting report image");
        let response = self
            .http
            .get(locator.as_str())
            .send()
            .await
            .with_context(|| format!("request for {locator} failed"))?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(kind) = &content_type {
            if !kind.starts_with("image/") {
                return Err(anyhow!("{locator} is not an image (content-type {kind})"));
            }
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(anyhow!("{locator} returned an empty body"));
        }

        info!(locator = %locator, size_bytes = bytes.len(), "http: report image received");
        Ok(LoadedImage {
            bytes,
            content_type,
        })
    }
}

pub struct HttpNetworkProbe {
    http: Client,
    origin: ReportOrigin,
}

impl HttpNetworkProbe {
    pub fn new(origin: ReportOrigin) -> Self {
        Self {
            http: Client::new(),
            origin,
        }
    }
}

#[async_trait]
impl NetworkProbe for HttpNetworkProbe {
    /// Online means the origin host still resolves.
    async fn is_online(&self) -> bool {
        let Some((host, port)) = self.origin.host_and_port() else {
            return false;
        };
        let lookup = tokio::net::lookup_host((host.as_str(), port)).await;
        match lookup {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(err) => {
                debug!(host = %host, "network: host lookup failed: {err}");
                false
            }
        }
    }

    /// Any HTTP answer counts as reachable, error statuses included.
    async fn probe_origin(&self) -> Result<()> {
        let response = self
            .http
            .head(self.origin.as_str())
            .send()
            .await
            .with_context(|| format!("origin {} unreachable", self.origin))?;
        debug!(status = response.status().as_u16(), "network: origin answered probe");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
