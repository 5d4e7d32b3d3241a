use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use underdoc_core::config::{ClientConfig, Credential, RetryPolicy};
use underdoc_core::error::{Result, UnderdocError};
use underdoc_core::transport::{Method, RawResponse, Transport, TransportRequest};

use crate::backoff::{parse_retry_after, Backoff};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "UNDERDOC_API_KEY";

const BODY_EXCERPT_CHARS: usize = 500;

/// reqwest-backed [`Transport`] with a pooled connection client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Credential,
    retry: RetryPolicy,
}

/// A failed attempt that may succeed if repeated.
#[derive(Debug)]
enum RetriableFailure {
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },
    Server {
        status: StatusCode,
        body: String,
        retry_after: Option<std::time::Duration>,
    },
    Network(reqwest::Error),
}

impl RetriableFailure {
    fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { retry_after } | Self::Server { retry_after, .. } => *retry_after,
            Self::Network(_) => None,
        }
    }

    fn into_error(self, attempts: u32) -> UnderdocError {
        match self {
            Self::RateLimited { retry_after } => UnderdocError::RateLimited {
                attempts,
                retry_after,
            },
            Self::Server { status, body, .. } => UnderdocError::TransientNetwork {
                attempts,
                message: format!("service returned HTTP {status}: {body}"),
                source: None,
            },
            Self::Network(e) => UnderdocError::TransientNetwork {
                attempts,
                message: e.to_string(),
                source: Some(e),
            },
        }
    }
}

impl std::fmt::Display for RetriableFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited { .. } => write!(f, "rate limited"),
            Self::Server { status, .. } => write!(f, "HTTP {status}"),
            Self::Network(e) => write!(f, "{e}"),
        }
    }
}

enum Attempt {
    Done(Result<RawResponse>),
    Retry(RetriableFailure),
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UnderdocError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: config.retry.clone(),
        })
    }

    /// The pooled client, for callers that need plain HTTP (document downloads).
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn attempt(&self, request: &TransportRequest) -> Attempt {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        builder = builder.header(API_KEY_HEADER, self.api_key.expose());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return Attempt::Done(Err(UnderdocError::Config(format!(
                    "could not build request to {url}: {e}"
                ))))
            }
            Err(e) => return Attempt::Retry(RetriableFailure::Network(e)),
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));

        if !status.is_success() {
            // The status alone decides the outcome; the body is only diagnostic.
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body_len = body.len(), "Received error response");
            return classify_failure(status, retry_after, &body);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Retry(RetriableFailure::Network(e)),
        };
        debug!(status = status.as_u16(), body_len = body.len(), "Received response");

        Attempt::Done(decode_body(&body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        let max_attempts = if request.idempotent {
            self.retry.max_retries + 1
        } else {
            1
        };
        let mut backoff = Backoff::for_retries(&self.retry);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match self.attempt(&request).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(failure) => failure,
            };

            if attempt >= max_attempts {
                warn!(attempt, reason = %failure, "Giving up on request");
                return Err(failure.into_error(attempt));
            }

            let computed = backoff.next_delay();
            let delay = failure.retry_after().unwrap_or(computed);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "Retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Maps a non-success status to a retry or a final error.
fn classify_failure(
    status: StatusCode,
    retry_after: Option<std::time::Duration>,
    body: &str,
) -> Attempt {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Attempt::Retry(RetriableFailure::RateLimited { retry_after });
    }
    if status.is_server_error() {
        return Attempt::Retry(RetriableFailure::Server {
            status,
            body: excerpt(body),
            retry_after,
        });
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Attempt::Done(Err(UnderdocError::Authentication {
            status: status.as_u16(),
            message: excerpt(body),
        }));
    }
    Attempt::Done(Err(UnderdocError::Rejected {
        status: status.as_u16(),
        message: excerpt(body),
    }))
}

fn decode_body(body: &str) -> Result<RawResponse> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        UnderdocError::Protocol(format!("malformed response body ({e}): {}", excerpt(body)))
    })?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(UnderdocError::Protocol(format!(
            "expected a JSON object, got {}",
            excerpt(&other.to_string())
        ))),
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
