//! Reading the job envelope shared by the submission and status endpoints:
//! `job_id`, `status`, `result`, `confidence`, `error`, or the legacy
//! synchronous `receipt_data` shape.

use serde_json::Value;

use underdoc_core::error::{Result, UnderdocError};
use underdoc_core::job::{JobId, JobStatus};
use underdoc_core::transport::RawResponse;

pub(crate) const RESULT_KEY: &str = "result";
pub(crate) const LEGACY_RESULT_KEY: &str = "receipt_data";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Envelope {
    pub job_id: Option<JobId>,
    pub status: Option<JobStatus>,
    pub error: Option<String>,
    pub has_result: bool,
}

impl Envelope {
    pub fn read(raw: &RawResponse) -> Result<Self> {
        let job_id = match raw.get("job_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if !id.is_empty() => Some(JobId::new(id.clone())),
            Some(other) => {
                return Err(UnderdocError::Protocol(format!(
                    "job_id must be a non-empty string, got {other}"
                )))
            }
        };

        let status = match raw.get("status") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(JobStatus::parse(s).ok_or_else(|| {
                UnderdocError::Protocol(format!("unknown job status {s:?}"))
            })?),
            Some(other) => {
                return Err(UnderdocError::Protocol(format!(
                    "status must be a string, got {other}"
                )))
            }
        };

        let error = match raw.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(obj)) => Some(
                obj.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
            ),
            Some(other) => Some(other.to_string()),
        };

        let has_result = raw.contains_key(RESULT_KEY) || raw.contains_key(LEGACY_RESULT_KEY);

        Ok(Self {
            job_id,
            status,
            error,
            has_result,
        })
    }

    /// The service already finished the work and the payload carries it.
    pub fn is_inline_result(&self) -> bool {
        match self.status {
            Some(JobStatus::Succeeded) => self.has_result,
            None => self.has_result,
            _ => false,
        }
    }

    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "service supplied no failure detail".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawResponse {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_reads_queued_job() {
        let env = Envelope::read(&raw(json!({"job_id": "job-123", "status": "queued"}))).unwrap();
        assert_eq!(env.job_id, Some(JobId::new("job-123")));
        assert_eq!(env.status, Some(JobStatus::Queued));
        assert!(!env.is_inline_result());
    }

    #[test]
    fn test_legacy_shape_is_inline() {
        let env = Envelope::read(&raw(json!({"receipt_data": {"image_type": "Receipt"}}))).unwrap();
        assert!(env.job_id.is_none());
        assert!(env.is_inline_result());
    }

    #[test]
    fn test_succeeded_with_result_is_inline() {
        let env = Envelope::read(&raw(json!({
            "job_id": "j", "status": "succeeded", "result": {}
        })))
        .unwrap();
        assert!(env.is_inline_result());
    }

    #[test]
    fn test_unknown_status_is_protocol_error() {
        let err = Envelope::read(&raw(json!({"job_id": "j", "status": "done"}))).unwrap_err();
        assert!(matches!(err, UnderdocError::Protocol(_)));
    }

    #[test]
    fn test_numeric_job_id_is_protocol_error() {
        let err = Envelope::read(&raw(json!({"job_id": 12}))).unwrap_err();
        assert!(matches!(err, UnderdocError::Protocol(_)));
    }

    #[test]
    fn test_error_object_message() {
        let env = Envelope::read(&raw(json!({
            "status": "failed",
            "error": {"code": "E1", "message": "corrupt image"}
        })))
        .unwrap();
        assert_eq!(env.failure_reason(), "corrupt image");
    }

    #[test]
    fn test_missing_failure_detail() {
        let env = Envelope::read(&raw(json!({"status": "failed"}))).unwrap();
        assert_eq!(env.failure_reason(), "service supplied no failure detail");
    }
}
