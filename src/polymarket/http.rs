use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tokio::time::sleep;

use crate::errors::HttpError;

const USER_AGENT: &str = concat!("polywatch/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

/// Retry budget shared by every outbound call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    /// Delay after the n-th failed attempt. The last entry repeats.
    pub backoff: Vec<Duration>,
    /// Used for 429 responses that carry no usable `Retry-After`.
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(45),
            ],
            default_retry_after: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget with no waiting. For tests and one-shot tools.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![Duration::ZERO],
            default_retry_after: Duration::ZERO,
        }
    }

    pub fn backoff_for(&self, attempt: usize) -> Duration {
        self.backoff
            .get(attempt)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn retry_after(&self, headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.default_retry_after)
    }
}

/// JSON-over-HTTP client with timeouts, backoff on transient failures and
/// `Retry-After` handling for rate limits. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    policy: Arc<RetryPolicy>,
}

impl HttpClient {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Result<Self, HttpError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            policy: Arc::new(policy),
        })
    }

    /// GET `url` with query `params` and decode the JSON body.
    pub async fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, HttpError> {
        let url = Url::parse_with_params(url, params)
            .map_err(|e| HttpError::Url(format!("{url}: {e}")))?;
        self.execute("GET", url.as_str(), || self.http.get(url.clone()))
            .await
    }

    /// POST a JSON payload and decode the JSON response.
    pub async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, HttpError> {
        self.execute("POST", url, || self.http.post(url).json(payload))
            .await
    }

    async fn execute<F>(&self, method: &'static str, url: &str, build: F) -> Result<Value, HttpError>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut last: Option<HttpError> = None;

        for attempt in 0..attempts {
            match build().send().await {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = self.policy.retry_after(resp.headers());
                    tracing::warn!(
                        url = %redact(url),
                        wait_secs = wait.as_secs(),
                        "Rate-limited, waiting before retry"
                    );
                    last = Some(HttpError::Status {
                        url: redact(url),
                        status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    });
                    if attempt + 1 < attempts {
                        sleep(wait).await;
                    }
                }
                Ok(resp) if !resp.status().is_success() => {
                    return Err(HttpError::Status {
                        url: redact(url),
                        status: resp.status().as_u16(),
                    });
                }
                Ok(resp) => return Ok(resp.json::<Value>().await?),
                Err(e) if is_transient(&e) => {
                    tracing::warn!(
                        url = %redact(url),
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "{method} failed"
                    );
                    last = Some(HttpError::Request(e));
                    if attempt + 1 < attempts {
                        sleep(self.policy.backoff_for(attempt)).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(HttpError::RetriesExhausted {
            method,
            url: redact(url),
            attempts,
            last: last.map(Box::new),
        })
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

/// Strip the Telegram bot token out of URLs before they reach logs.
fn redact(url: &str) -> String {
    match url.find("/bot") {
        Some(start) => {
            let rest = &url[start + 4..];
            let end = rest.find('/').map(|i| start + 4 + i).unwrap_or(url.len());
            format!("{}/bot<redacted>{}", &url[..start], &url[end..])
        }
        None => url.to_string(),
    }
}
