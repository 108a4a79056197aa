//! HTTP clients for the services tally talks to.
//!
//! - [`sheets`] - Google Sheets REST v4 (values and batchUpdate)
//! - [`kite`] - Zerodha Kite Connect v3 (GTT triggers, holdings, instruments)
//! - [`yahoo`] - Yahoo Finance chart API quotes
//! - [`nse`] - NSE archive equity list
//!
//! Every request goes through [`retry::send_with_retry`]. Sheets calls are also
//! paced by a [`throttle::RateLimiter`]. Failures surface as [`ProviderError`].

pub mod kite;
pub mod nse;
pub mod retry;
pub mod sheets;
pub mod throttle;
pub mod yahoo;

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use tally_types;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Browser user agent; Yahoo and NSE reject library defaults.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{service} request failed after {attempts} attempts: {source}")]
    Connection {
        service: &'static str,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} API error {status}: {message}")]
    Api {
        service: &'static str,
        status: StatusCode,
        message: String,
    },
    #[error("failed to decode {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
    #[error("invalid {service} URL {url}")]
    InvalidUrl { service: &'static str, url: String },
    #[error("{0} credentials are not configured")]
    MissingCredentials(&'static str),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ProviderError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 429, or a quota message from an API that reports throttling in the body.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Api {
                status, message, ..
            } => {
                let message = message.to_ascii_lowercase();
                *status == StatusCode::TOO_MANY_REQUESTS
                    || message.contains("rate limit")
                    || message.contains("quota")
            }
            _ => false,
        }
    }
}

/// Build a client with the pool and keepalive settings shared by every service.
pub fn http_client(
    timeout: Duration,
    user_agent: Option<&str>,
) -> Result<reqwest::Client, ProviderError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(timeout)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .redirect(reqwest::redirect::Policy::limited(5));
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent.to_string());
    }
    builder.build().map_err(ProviderError::Client)
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Turn a retry outcome into a successful response or a typed error.
pub(crate) async fn into_response(
    outcome: retry::RetryOutcome,
    service: &'static str,
) -> Result<reqwest::Response, ProviderError> {
    let response = match outcome {
        retry::RetryOutcome::Success(resp) => return Ok(resp),
        retry::RetryOutcome::HttpError(resp) => resp,
        retry::RetryOutcome::ConnectionError { attempts, source } => {
            return Err(ProviderError::Connection {
                service,
                attempts,
                source,
            });
        }
        retry::RetryOutcome::NonRetryable(source) => {
            return Err(ProviderError::Connection {
                service,
                attempts: 1,
                source,
            });
        }
    };

    let status = response.status();
    let message = read_capped_error_body(response).await;
    tracing::warn!(service, status = %status, "API request failed");
    Err(ProviderError::Api {
        service,
        status,
        message,
    })
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    service: &'static str,
) -> Result<T, ProviderError> {
    let body = response.text().await.map_err(|e| ProviderError::Decode {
        service,
        message: e.to_string(),
    })?;
    serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
        service,
        message: e.to_string(),
    })
}

/// Parse a base URL, tolerating a trailing slash.
pub(crate) fn parse_base_url(
    raw: &str,
    service: &'static str,
) -> Result<reqwest::Url, ProviderError> {
    reqwest::Url::parse(raw.trim_end_matches('/')).map_err(|_| ProviderError::InvalidUrl {
        service,
        url: raw.to_string(),
    })
}

/// `base` with `segments` appended, each percent-encoded as one path segment.
pub(crate) fn endpoint<I, S>(
    base: &reqwest::Url,
    segments: I,
    service: &'static str,
) -> Result<reqwest::Url, ProviderError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ProviderError::InvalidUrl {
            service,
            url: base.to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_segments() {
        let base = parse_base_url("http://localhost:9000/", "test").unwrap();
        let url = endpoint(&base, ["v4", "spreadsheets", "id", "'My Tab'!A1:B2"], "test").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/v4/spreadsheets/id/'My%20Tab'!A1:B2"
        );
    }

    #[test]
    fn rate_limit_detection() {
        let err = ProviderError::Api {
            service: "sheets",
            status: StatusCode::TOO_MANY_REQUESTS,
            message: String::new(),
        };
        assert!(err.is_rate_limited());
        let err = ProviderError::Api {
            service: "sheets",
            status: StatusCode::FORBIDDEN,
            message: "Quota exceeded for quota metric 'Write requests'".into(),
        };
        assert!(err.is_rate_limited());
        assert!(!ProviderError::MissingCredentials("kite").is_rate_limited());
    }
}
