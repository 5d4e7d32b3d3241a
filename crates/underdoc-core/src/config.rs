use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UnderdocError};
use crate::schema::ExtractionSchema;

pub const DEFAULT_API_ENDPOINT: &str = "https://api.underdoc.io";
pub const API_KEY_ENV: &str = "UNDERDOC_API_KEY";
pub const API_ENDPOINT_ENV: &str = "UNDERDOC_API_ENDPOINT";

const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// API key sent with every request. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Transport-level retry policy for retriable HTTP failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Cadence and budget of the job completion waiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 1.5,
            max_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(skip_serializing)]
    pub api_key: Credential,
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub poll: PollPolicy,
    pub max_document_bytes: usize,
    /// Send an `Idempotency-Key` with submissions and allow them to be retried.
    /// Only safe when the service deduplicates by that key.
    pub idempotent_submission: bool,
    pub schema: ExtractionSchema,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: Credential::new(api_key),
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            poll: PollPolicy::default(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            idempotent_submission: false,
            schema: ExtractionSchema::expense(),
            user_agent: format!("underdoc-rust/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            UnderdocError::Config(format!(
                "api key is required: set the {API_KEY_ENV} environment variable"
            ))
        })?;
        let base_url =
            std::env::var(API_ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_API_ENDPOINT.into());
        Ok(Self::new(api_key, base_url))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.poll.max_wait = max_wait;
        self
    }

    pub fn with_max_document_bytes(mut self, bytes: usize) -> Self {
        self.max_document_bytes = bytes;
        self
    }

    pub fn with_idempotent_submission(mut self, enabled: bool) -> Self {
        self.idempotent_submission = enabled;
        self
    }

    pub fn with_schema(mut self, schema: ExtractionSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Joins `path` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(UnderdocError::Config("api key must not be empty".into()));
        }

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            UnderdocError::Config(format!("invalid base url {:?}: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UnderdocError::Config(format!(
                "base url must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(UnderdocError::Config("request timeout must be positive".into()));
        }
        if self.request_timeout >= self.poll.max_wait {
            return Err(UnderdocError::Config(format!(
                "request timeout ({:?}) must be smaller than max wait ({:?})",
                self.request_timeout, self.poll.max_wait
            )));
        }

        if self.poll.initial_interval.is_zero() {
            return Err(UnderdocError::Config("poll interval must be positive".into()));
        }
        if self.poll.max_interval < self.poll.initial_interval {
            return Err(UnderdocError::Config(
                "poll interval cap must not be below the initial interval".into(),
            ));
        }
        let multiplier_range = 1.0..=MAX_BACKOFF_MULTIPLIER;
        if !multiplier_range.contains(&self.poll.multiplier)
            || !multiplier_range.contains(&self.retry.multiplier)
        {
            return Err(UnderdocError::Config(format!(
                "backoff multipliers must be between 1 and {MAX_BACKOFF_MULTIPLIER}"
            )));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(UnderdocError::Config(
                "retry delay cap must not be below the base delay".into(),
            ));
        }

        if self.max_document_bytes == 0 {
            return Err(UnderdocError::Config("max document size must be positive".into()));
        }

        Ok(())
    }
}
