use thiserror::Error;
use tracing::{error, info};

use markmap_core::contract::{FetchError, Fetcher};

/// Reasons a Markdown download can fail.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download failed with HTTP status {0}")]
    Status(u16),
}

/// Downloads Markdown over http(s).
#[derive(Debug, Default, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn download_text(&self, url: &str) -> Result<String, FetchFailure> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchFailure::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchFailure::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        info!(%url, "Fetching Markdown");
        let response = self.http.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(%url, status = status.as_u16(), "Markdown download rejected");
            return Err(FetchFailure::Status(status.as_u16()));
        }
        let body = response.text().await?;
        info!(%url, chars = body.chars().count(), "Fetched Markdown");
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        Ok(self.download_text(url).await?)
    }
}
