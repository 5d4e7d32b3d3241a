use std::time::Duration;

use thiserror::Error;

/// Coarse classification of an [`UnderdocError`], answering "what should the
/// caller do about it".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    RateLimited,
    TransientNetwork,
    JobFailed,
    Timeout,
    Schema,
    NotReady,
    Rejected,
    Protocol,
    Config,
    Io,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validation => "VALIDATION",
            Self::Authentication => "AUTHENTICATION",
            Self::RateLimited => "RATE_LIMITED",
            Self::TransientNetwork => "TRANSIENT_NETWORK",
            Self::JobFailed => "JOB_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Schema => "SCHEMA",
            Self::NotReady => "NOT_READY",
            Self::Rejected => "REJECTED",
            Self::Protocol => "PROTOCOL",
            Self::Config => "CONFIG",
            Self::Io => "IO",
            Self::Storage => "STORAGE",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum UnderdocError {
    #[error("Invalid document: {0}")]
    Validation(String),

    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("Rate limited after {attempts} attempts, retry after {retry_after:?}")]
    RateLimited {
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("Network error after {attempts} attempts: {message}")]
    TransientNetwork {
        attempts: u32,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("Job {job_id} did not finish within {waited:?}")]
    Timeout { job_id: String, waited: Duration },

    #[error("Schema violation at `{path}`: {message}")]
    Schema { path: String, message: String },

    #[error("Job {job_id} is still {status}")]
    NotReady { job_id: String, status: String },

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object storage error at {location}: {message}")]
    Storage { location: String, message: String },
}

impl UnderdocError {
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::TransientNetwork { .. } => ErrorKind::TransientNetwork,
            Self::JobFailed { .. } => ErrorKind::JobFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Config(_) => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Whether trying the same call again later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::TransientNetwork { .. } | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UnderdocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            UnderdocError::Validation("empty".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            UnderdocError::schema("total", "missing").kind(),
            ErrorKind::Schema
        );
        assert_eq!(
            UnderdocError::NotReady {
                job_id: "job-1".into(),
                status: "queued".into()
            }
            .kind(),
            ErrorKind::NotReady
        );
        let storage = UnderdocError::Storage {
            location: "s3://receipts/a.jpg".into(),
            message: "NoSuchKey".into(),
        };
        assert_eq!(storage.kind(), ErrorKind::Storage);
        assert!(!storage.is_retryable());
    }

    #[test]
    fn test_retryable_only_for_transient_conditions() {
        assert!(UnderdocError::RateLimited {
            attempts: 4,
            retry_after: None
        }
        .is_retryable());
        assert!(UnderdocError::TransientNetwork {
            attempts: 4,
            message: "connection refused".into(),
            source: None
        }
        .is_retryable());
        assert!(!UnderdocError::Authentication {
            status: 401,
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!UnderdocError::schema("total", "expected number").is_retryable());
        assert!(!UnderdocError::Validation("too large".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = UnderdocError::JobFailed {
            job_id: "job-9".into(),
            reason: "corrupt image".into(),
        };
        assert_eq!(err.to_string(), "Job job-9 failed: corrupt image");
        assert_eq!(ErrorKind::JobFailed.to_string(), "JOB_FAILED");
    }
}
