use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{info, warn};

use crate::urls::UrlEntry;

const USER_AGENT: &str = concat!("literaryqa/", env!("CARGO_PKG_VERSION"));

/// Downloads raw Gutenberg HTML, retrying transient failures with
/// exponential backoff. Missing books (4xx) are permanent failures and are
/// reported to the caller without retrying.
pub struct GutenbergFetcher {
    client: reqwest::Client,
    max_retries: usize,
    backoff_ms: u64,
}

impl GutenbergFetcher {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.download_max_retries,
            backoff_ms: config.download_backoff_ms,
        })
    }

    /// Fetch the raw page body for a manifest entry.
    pub async fn fetch_book(&self, entry: &UrlEntry) -> Result<String, AppError> {
        ensure_fetch_url_allowed(&entry.url)?;

        let retry_strategy = ExponentialBackoff::from_millis(self.backoff_ms)
            .map(jitter)
            .take(self.max_retries.saturating_sub(1));

        let book_id = entry.gutenberg_id.as_str();
        RetryIf::spawn(
            retry_strategy,
            || async {
                info!(book_id, url = %entry.url, "Downloading Gutenberg book");
                self.fetch_once(&entry.url).await
            },
            |err: &AppError| {
                let transient = err.is_transient();
                if transient {
                    warn!(book_id, error = %err, "Transient download failure, will retry");
                }
                transient
            },
        )
        .await
    }

    async fn fetch_once(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.text().await?);
        }
        if status.is_client_error() {
            return Err(AppError::NotFound(format!(
                "Gutenberg responded {status} for {url}"
            )));
        }
        Err(AppError::Processing(format!(
            "Gutenberg responded {status} for {url}"
        )))
    }
}

/// Reject URLs the fetcher should never touch before any request goes out.
fn ensure_fetch_url_allowed(raw: &str) -> Result<(), AppError> {
    let url =
        url::Url::parse(raw).map_err(|_| AppError::Validation(format!("Invalid URL: {raw}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "Rejected download URL due to unsupported scheme");
            return Err(AppError::Validation(
                "Unsupported URL scheme for download".to_string(),
            ));
        }
    }

    if url.host_str().is_none() {
        warn!(%url, "Rejected download URL missing host");
        return Err(AppError::Validation(
            "URL is missing a host component".to_string(),
        ));
    }

    Ok(())
}
