//! Maps an identity token onto the report image under the configured origin.

use std::fmt;

use shared::IdentityToken;
use thiserror::Error;
use url::Url;

pub const REPORT_EXTENSION: &str = ".jpg";

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("invalid report origin '{raw}': {source}")]
    Parse {
        raw: String,
        source: url::ParseError,
    },
    #[error("report origin '{0}' must use http or https")]
    UnsupportedScheme(String),
    #[error("report origin '{0}' must not carry a query or fragment")]
    HasQuery(String),
}

/// Absolute http(s) base every report locator is resolved against.
/// Always ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOrigin(Url);

impl ReportOrigin {
    pub fn parse(raw: &str) -> Result<Self, OriginError> {
        let raw = raw.trim();
        let mut url = Url::parse(raw).map_err(|source| OriginError::Parse {
            raw: raw.to_string(),
            source,
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(OriginError::UnsupportedScheme(raw.to_string()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(OriginError::HasQuery(raw.to_string()));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host_and_port(&self) -> Option<(String, u16)> {
        let host = self.0.host_str()?.to_string();
        let port = self.0.port_or_known_default()?;
        Some((host, port))
    }
}

impl fmt::Display for ReportOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure function of origin and token; the attempt number never enters it, so
/// every retry re-issues the identical request.
pub fn derive_locator(origin: &ReportOrigin, token: &IdentityToken) -> ResourceLocator {
    ResourceLocator(format!(
        "{}{}{REPORT_EXTENSION}",
        origin.as_str(),
        urlencoding::encode(token.as_str())
    ))
}
