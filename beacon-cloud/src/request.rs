use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Span, field, instrument};

use crate::config::RequestConfig;
use crate::util::http::Uri;
use crate::util::interrupt::Interrupt;
use crate::util::types::ApiKey;

/// Outcome of a single attempt
#[derive(Debug, Error)]
enum TryRequestError {
    /// Network errors, 5xx and rate limiting responses
    #[error("request failed with: {0} ... will retry in {1:#?}")]
    WillRetry(String, Duration),

    /// Any other non-success status, it will not get better by retrying
    #[error("server replied: {0}")]
    Status(StatusCode, String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("server replied with {0}: {1}")]
    Status(StatusCode, String),

    #[error("giving up after {0} attempts, last error: {1}")]
    RetriesExhausted(u32, String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("cancelled")]
    Cancelled,
}

/// A successful response
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    /// The decoded JSON body, `None` if the body was empty
    pub body: Option<Value>,
}

/// Success and failure counts of the requests made by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMetrics {
    pub success_count: u64,
    pub error_count: u64,
}

impl RequestMetrics {
    pub fn total_requests(&self) -> u64 {
        self.success_count + self.error_count
    }

    /// Percentage of successful requests, 0.0 if no requests were made yet
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.success_count as f64 / total as f64) * 100.0
        }
    }
}

/// Longest the client waits between two attempts, whatever the server or
/// the configuration ask for
const MAX_WAIT: Duration = Duration::from_secs(3600);

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_WAIT))
}

/// The instant `delay` from now, capped at [`MAX_WAIT`]
fn deadline(delay: Duration) -> Instant {
    Instant::now() + delay.min(MAX_WAIT)
}

/// JSON over HTTP client with rate limiting and bounded retries.
///
/// Consecutive requests are spaced by at least `min_interval`. Network
/// errors, 5xx, 429 and 503 responses are retried with an exponential
/// backoff starting at `min_interval` and capped at `max_backoff`, unless
/// the server sends a `Retry-After` header. A request fails once it has been
/// retried `max_retries` times.
pub struct Client {
    http: reqwest::Client,
    config: RequestConfig,
    next_request: Option<Instant>,
    current_backoff: Duration,
    success_count: u64,
    error_count: u64,
}

impl Client {
    pub fn new(config: RequestConfig) -> Result<Self, RequestError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RequestError::Build)?;
        let current_backoff = config.min_interval;
        Ok(Self {
            http,
            config,
            next_request: None,
            current_backoff,
            success_count: 0,
            error_count: 0,
        })
    }

    pub fn metrics(&self) -> RequestMetrics {
        RequestMetrics {
            success_count: self.success_count,
            error_count: self.error_count,
        }
    }

    fn record_success(&mut self) {
        self.success_count += 1;
        self.current_backoff = self.config.min_interval;
        self.next_request = Some(deadline(self.config.min_interval));
    }

    fn record_failure(&mut self, retry_after: Option<Duration>) {
        self.error_count += 1;
        let backoff = if let Some(duration) = retry_after {
            duration
        } else {
            self.current_backoff = self
                .current_backoff
                .saturating_mul(2)
                .min(self.config.max_backoff);
            self.current_backoff
        };
        self.next_request = Some(deadline(backoff));
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(next) = self.next_request
            && Instant::now() < next
        {
            tokio::time::sleep_until(next).await;
        }
    }

    /// Send a request, retrying recoverable failures.
    ///
    /// `token` is sent as a bearer token and `body` as JSON. The call
    /// returns `RequestError::Cancelled` as soon as `interrupt` triggers.
    #[instrument(
        level = "debug",
        skip_all,
        fields(
            method = %method,
            endpoint = %endpoint,
            retries = field::Empty,
            success_rate = field::Empty,
            cancelled = field::Empty
        )
    )]
    pub async fn send(
        &mut self,
        method: Method,
        endpoint: &Uri,
        token: Option<&ApiKey>,
        body: Option<&Value>,
        interrupt: &Interrupt,
    ) -> Result<Reply, RequestError> {
        // re-set the back off in case the last request was dropped
        self.current_backoff = self.config.min_interval;
        let mut retries = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = interrupt.wait() => {
                    Span::current().record("cancelled", true);
                    return Err(RequestError::Cancelled);
                }
                res = self.try_send(method.clone(), endpoint, token, body) => res,
            };

            match result {
                Ok(reply) => {
                    Span::current().record("retries", retries);
                    Span::current().record("success_rate", self.metrics().success_rate());
                    return Ok(reply);
                }
                Err(TryRequestError::WillRetry(reason, _)) => {
                    if retries >= self.config.max_retries {
                        Span::current().record("retries", retries);
                        return Err(RequestError::RetriesExhausted(retries + 1, reason));
                    }
                    retries += 1;
                }
                Err(TryRequestError::Status(status, message)) => {
                    return Err(RequestError::Status(status, message));
                }
                Err(TryRequestError::Decode(err)) => return Err(err.into()),
            }
        }
    }

    #[instrument(level = "trace", skip_all, fields(response = field::Empty), err(level = "warn"))]
    async fn try_send(
        &mut self,
        method: Method,
        endpoint: &Uri,
        token: Option<&ApiKey>,
        body: Option<&Value>,
    ) -> Result<Reply, TryRequestError> {
        self.wait_for_rate_limit().await;

        // Reset the interval in case the future gets dropped before a response
        // is received
        self.next_request = Some(deadline(self.config.min_interval));

        let mut request = self
            .http
            .request(method, endpoint.to_string())
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                self.record_failure(None);
                return Err(TryRequestError::WillRetry(
                    err.to_string(),
                    self.current_backoff,
                ));
            }
        };

        let status = response.status();
        Span::current().record("response", field::display(status));

        match status {
            status if status.is_success() => {
                let text = match response.text().await {
                    Ok(text) => text,
                    Err(err) => {
                        self.record_failure(None);
                        return Err(TryRequestError::WillRetry(
                            err.to_string(),
                            self.current_backoff,
                        ));
                    }
                };
                self.record_success();

                let body = if text.trim().is_empty() {
                    None
                } else {
                    Some(serde_json::from_str(&text)?)
                };
                Ok(Reply { status, body })
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                let retry_after = parse_retry_after(response.headers());
                self.record_failure(retry_after);
                Err(TryRequestError::WillRetry(
                    format!("server responded with {status}"),
                    retry_after.unwrap_or(self.current_backoff),
                ))
            }
            status if status.is_server_error() => {
                self.record_failure(None);
                Err(TryRequestError::WillRetry(
                    format!("server responded with {status}"),
                    self.current_backoff,
                ))
            }
            _ => {
                // Other 4xx client errors are permanent
                self.error_count += 1;
                self.current_backoff = self.config.min_interval;
                let message = response.text().await.unwrap_or_default();
                Err(TryRequestError::Status(status, message))
            }
        }
    }
}
