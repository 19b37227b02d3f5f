//! Client for the remote time API used by the `get-time` worker.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Errors returned while fetching the current time.
#[derive(thiserror::Error, Debug)]
pub enum TimeApiError {
    /// The request could not be sent or the body could not be read.
    #[error("time api request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("time api returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, when readable
        message: String,
    },
    /// The body is not the expected JSON document.
    #[error("malformed time api response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The current time as reported by the time API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    /// Formatted timestamp
    pub time: String,
    /// Hour of the day
    pub hour: i32,
    /// Minute of the hour
    pub minute: i32,
    /// Second of the minute
    pub second: i32,
    /// Day of the month
    pub day: i32,
    /// Month of the year, 1 based
    pub month: i32,
    /// Calendar year
    pub year: i32,
}

/// HTTP client for the time API.
#[derive(Clone, Debug)]
pub struct TimeApi {
    url: String,
    client: reqwest::Client,
}

impl TimeApi {
    /// Query `url` for the current time with the HTTP client's defaults.
    pub fn new(url: impl Into<String>) -> Result<Self, TimeApiError> {
        TimeApi::with_timeout(url, None)
    }

    /// Query `url`, giving up on a request after `timeout` when one is set.
    pub fn with_timeout(
        url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, TimeApiError> {
        let builder = reqwest::Client::builder();
        let builder = match timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };
        Ok(TimeApi {
            url: url.into(),
            client: builder.build()?,
        })
    }

    /// Fetch the current time with a single GET request.
    #[tracing::instrument(skip(self), fields(url = %self.url), err)]
    pub async fn fetch(&self) -> Result<Time, TimeApiError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(TimeApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "received time");
        Ok(serde_json::from_slice(&body)?)
    }
}
