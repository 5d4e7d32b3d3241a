use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use underdoc_core::config::ClientConfig;
use underdoc_core::document::{DocumentInput, ImageFormat};
use underdoc_core::error::{Result, UnderdocError};
use underdoc_core::job::{Job, JobId, JobStatus};
use underdoc_core::result::ExtractionResult;
use underdoc_core::transport::{RawResponse, Transport, TransportRequest};

use crate::envelope::Envelope;
use crate::parser::ResultParser;

pub const SUBMIT_PATH: &str = "expenses/extract";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Wire body of a submission.
#[derive(Debug, Serialize)]
struct SubmissionRequest<'a> {
    image_format: ImageFormat,
    image_data: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: &'a BTreeMap<String, String>,
}

/// What the service did with a submitted document.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Accepted for asynchronous processing.
    Pending(Job),
    /// Processed inline; no polling needed.
    Completed(ExtractionResult),
}

/// Accepted submission before the payload is parsed.
enum Accepted {
    Job(Job),
    Inline {
        job_id: Option<JobId>,
        payload: RawResponse,
    },
}

#[derive(Clone)]
pub struct Submitter {
    transport: Arc<dyn Transport>,
    parser: ResultParser,
    max_document_bytes: usize,
    idempotent: bool,
}

impl Submitter {
    pub fn new(transport: Arc<dyn Transport>, parser: ResultParser, config: &ClientConfig) -> Self {
        Self {
            transport,
            parser,
            max_document_bytes: config.max_document_bytes,
            idempotent: config.idempotent_submission,
        }
    }

    /// Validates the document and encodes it. No network access.
    pub fn build_request(&self, document: &DocumentInput) -> Result<TransportRequest> {
        let image_format = document.validate(self.max_document_bytes)?;

        let body = SubmissionRequest {
            image_format,
            image_data: base64::engine::general_purpose::STANDARD.encode(document.bytes()),
            metadata: document.metadata(),
        };
        let payload = serde_json::to_value(&body).map_err(|e| {
            UnderdocError::Validation(format!("could not encode submission: {e}"))
        })?;

        let mut request = TransportRequest::post(SUBMIT_PATH, payload);
        if self.idempotent {
            request = request
                .with_header(IDEMPOTENCY_KEY_HEADER, Uuid::new_v4().to_string())
                .idempotent(true);
        }
        Ok(request)
    }

    /// Submits a document, returning either a pending job or an inline result.
    pub async fn submit(&self, document: &DocumentInput) -> Result<Submission> {
        match self.send(document).await? {
            Accepted::Job(job) => Ok(Submission::Pending(job)),
            Accepted::Inline { payload, .. } => {
                Ok(Submission::Completed(self.parser.parse(&payload)?))
            }
        }
    }

    /// Submits a document and always hands back a [`Job`]. An inline answer
    /// becomes an already-succeeded job holding its payload.
    pub async fn submit_job(&self, document: &DocumentInput) -> Result<Job> {
        match self.send(document).await? {
            Accepted::Job(job) => Ok(job),
            Accepted::Inline { job_id, payload } => {
                let id = job_id.unwrap_or_else(|| JobId::new(format!("inline-{}", Uuid::new_v4())));
                Ok(Job::completed(id, payload))
            }
        }
    }

    #[instrument(skip(self, document), fields(source = ?document.source()))]
    async fn send(&self, document: &DocumentInput) -> Result<Accepted> {
        let request = self.build_request(document)?;

        info!(
            bytes = document.len(),
            mime_type = %document.mime_type(),
            idempotent = request.idempotent,
            "Submitting document"
        );

        let raw = self.transport.send(request).await?;
        let envelope = Envelope::read(&raw)?;

        if envelope.status == Some(JobStatus::Failed) {
            return Err(UnderdocError::JobFailed {
                job_id: envelope
                    .job_id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<unassigned>".to_string()),
                reason: envelope.failure_reason(),
            });
        }

        if envelope.is_inline_result() {
            info!(job_id = ?envelope.job_id, "Service answered inline");
            return Ok(Accepted::Inline {
                job_id: envelope.job_id,
                payload: raw,
            });
        }

        let job_id = envelope.job_id.ok_or_else(|| {
            UnderdocError::Protocol("submission response carries neither job_id nor result".into())
        })?;
        let status = envelope.status.unwrap_or(JobStatus::Queued);
        if status == JobStatus::Succeeded {
            return Err(UnderdocError::Protocol(format!(
                "job {job_id} reported succeeded at submission without a result"
            )));
        }

        info!(job_id = %job_id, status = %status, "Document accepted");
        Ok(Accepted::Job(Job::new(job_id, status)))
    }
}
