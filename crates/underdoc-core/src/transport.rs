use async_trait::async_trait;

use crate::error::Result;

/// Unvalidated JSON object returned by the service.
pub type RawResponse = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// One logical call against the service, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub payload: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    /// Only idempotent requests are retried.
    pub idempotent: bool,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            payload: None,
            headers: Vec::new(),
            idempotent: true,
        }
    }

    pub fn post(path: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            payload: Some(payload),
            headers: Vec::new(),
            idempotent: false,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }
}

/// The only seam that touches the network. Implementations attach the
/// credential, enforce the per-call timeout and apply the retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse>;
}
