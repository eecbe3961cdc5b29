use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Failure of a single outbound call.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// HTTP client issuing one bounded GET per call.
///
/// Each call is capped by the client timeout and raced against the caller's
/// cancellation token; whichever fires first drops the in-flight request.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch JSON from `url` with the given query parameters.
    #[instrument(skip(self, cancel, query), fields(url = %url))]
    pub async fn get_json<T>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %url, "Request cancelled by caller");
                Err(UpstreamError::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, self.fetch(url, query)) => match result {
                Ok(response) => response,
                Err(_) => Err(UpstreamError::Timeout(url.to_string())),
            },
        }
    }

    async fn fetch<T>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        // Query strings carry API keys, keep them out of error messages.
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(url.to_string())
                } else {
                    UpstreamError::Transport(e.without_url())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.without_url()))?;
        let json: T = serde_json::from_str(&text)?;

        Ok(json)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
