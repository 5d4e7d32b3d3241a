use std::sync::Arc;

use tracing::{info, instrument};

use underdoc_core::config::ClientConfig;
use underdoc_core::document::DocumentInput;
use underdoc_core::error::{Result, UnderdocError};
use underdoc_core::job::{Job, JobStatus};
use underdoc_core::result::ExtractionResult;
use underdoc_core::transport::Transport;

use crate::fetch;
use crate::http::HttpTransport;
use crate::parser::ResultParser;
use crate::poller::CompletionWaiter;
use crate::submit::{Submission, Submitter};

/// Entry point for document extraction. Cheap to clone; clones share the
/// connection pool.
#[derive(Clone)]
pub struct Client {
    submitter: Submitter,
    waiter: CompletionWaiter,
    parser: ResultParser,
    downloader: reqwest::Client,
    max_document_bytes: usize,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        let downloader = transport.http_client().clone();
        Ok(Self::assemble(&config, Arc::new(transport), downloader))
    }

    /// Builds a client from `UNDERDOC_API_KEY` / `UNDERDOC_API_ENDPOINT`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Uses a caller-supplied transport instead of the reqwest one.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let downloader = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UnderdocError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::assemble(&config, transport, downloader))
    }

    fn assemble(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        downloader: reqwest::Client,
    ) -> Self {
        let parser = ResultParser::new(config.schema.clone());
        info!(base_url = %config.base_url, "UnderDoc client initialized");
        Self {
            submitter: Submitter::new(transport.clone(), parser.clone(), config),
            waiter: CompletionWaiter::new(transport, config.poll.clone()),
            parser,
            downloader,
            max_document_bytes: config.max_document_bytes,
        }
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Direct access to the waiter, e.g. to poll with a custom budget.
    pub fn waiter(&self) -> &CompletionWaiter {
        &self.waiter
    }

    pub fn parser(&self) -> &ResultParser {
        &self.parser
    }

    /// Largest document accepted for submission or download.
    pub fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    /// Submit, wait if the service queued the work, then validate the result.
    #[instrument(skip(self, document), fields(source = ?document.source()))]
    pub async fn extract(&self, document: &DocumentInput) -> Result<ExtractionResult> {
        match self.submitter.submit(document).await? {
            Submission::Completed(result) => Ok(result),
            Submission::Pending(mut job) => {
                let raw = self.waiter.wait_default(&mut job).await?;
                self.parser.parse(&raw)
            }
        }
    }

    /// Submission only. Pair with [`Client::get_result`] or [`Client::wait`].
    pub async fn submit_async(&self, document: &DocumentInput) -> Result<Job> {
        self.submitter.submit_job(document).await
    }

    /// Blocks (asynchronously) until `job` is terminal, using the configured
    /// poll policy.
    pub async fn wait(&self, job: &mut Job) -> Result<ExtractionResult> {
        let raw = self.waiter.wait_default(job).await?;
        self.parser.parse(&raw)
    }

    /// One status check. Fails with `NotReady` while the job is queued or
    /// processing.
    #[instrument(skip(self, job), fields(job_id = %job.id()))]
    pub async fn get_result(&self, job: &mut Job) -> Result<ExtractionResult> {
        if let Some(payload) = job.terminal_payload() {
            return self.parser.parse(payload);
        }

        let raw = self.waiter.poll_once(job).await?;
        match job.status() {
            JobStatus::Succeeded => self.parser.parse(&raw),
            status => Err(UnderdocError::NotReady {
                job_id: job.id().to_string(),
                status: status.to_string(),
            }),
        }
    }

    /// Downloads an image over HTTP so it can be submitted.
    pub async fn fetch_document(&self, url: &str) -> Result<DocumentInput> {
        fetch::fetch_document(&self.downloader, url, self.max_document_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;
    use underdoc_core::config::PollPolicy;
    use underdoc_core::schema::{ExtractionSchema, FieldType};

    fn config() -> ClientConfig {
        ClientConfig::new("key", "https://api.example.com")
            .with_request_timeout(Duration::from_millis(500))
            .with_poll(PollPolicy {
                initial_interval: Duration::from_millis(5),
                multiplier: 1.5,
                max_interval: Duration::from_millis(20),
                max_wait: Duration::from_secs(2),
            })
            .with_schema(
                ExtractionSchema::new()
                    .required("total", FieldType::Number)
                    .required("date", FieldType::Date),
            )
    }

    fn client(transport: Arc<ScriptedTransport>) -> Client {
        Client::with_transport(config(), transport).unwrap()
    }

    fn jpeg_2kb() -> DocumentInput {
        DocumentInput::new(vec![0xAB; 2048], "image/jpeg")
    }

    #[tokio::test]
    async fn test_extract_queued_processing_succeeded() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"job_id": "job-123", "status": "queued"})),
            Ok(json!({"job_id": "job-123", "status": "processing"})),
            Ok(json!({
                "job_id": "job-123",
                "status": "succeeded",
                "result": {"total": "123.45", "date": "2024-01-10"}
            })),
        ]));
        let result = client(transport.clone()).extract(&jpeg_2kb()).await.unwrap();

        assert_eq!(result.number("total"), Some(123.45));
        assert_eq!(result.date("date"), NaiveDate::from_ymd_opt(2024, 1, 10));
        assert_eq!(result.job_id().unwrap().as_str(), "job-123");
        assert_eq!(
            transport.paths(),
            vec!["expenses/extract", "jobs/job-123", "jobs/job-123"]
        );
    }

    #[tokio::test]
    async fn test_extract_missing_required_field() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"job_id": "job-1", "status": "queued"})),
            Ok(json!({"job_id": "job-1", "status": "succeeded", "result": {"date": "2024-01-10"}})),
        ]));
        let err = client(transport).extract(&jpeg_2kb()).await.unwrap_err();
        assert!(matches!(err, UnderdocError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_extract_oversized_makes_no_calls() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let config = config().with_max_document_bytes(1024);
        let client = Client::with_transport(config, transport.clone()).unwrap();
        let err = client.extract(&jpeg_2kb()).await.unwrap_err();
        assert!(matches!(err, UnderdocError::Validation(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_get_result_not_ready_then_ready() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"job_id": "job-2", "status": "queued"})),
            Ok(json!({"job_id": "job-2", "status": "processing"})),
            Ok(json!({
                "job_id": "job-2",
                "status": "succeeded",
                "result": {"total": 5, "date": "2024-02-01"}
            })),
        ]));
        let client = client(transport.clone());
        let mut job = client.submit_async(&jpeg_2kb()).await.unwrap();

        let err = client.get_result(&mut job).await.unwrap_err();
        assert!(matches!(err, UnderdocError::NotReady { .. }));
        assert_eq!(job.status(), JobStatus::Processing);

        let first = client.get_result(&mut job).await.unwrap();
        let second = client.get_result(&mut job).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_poll_after_terminal_regression() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"job_id": "job-3", "status": "queued"})),
            Ok(json!({
                "job_id": "job-3",
                "status": "succeeded",
                "result": {"total": 5, "date": "2024-02-01"}
            })),
            Ok(json!({"job_id": "job-3", "status": "processing"})),
        ]));
        let client = client(transport);
        let mut job = client.submit_async(&jpeg_2kb()).await.unwrap();
        client.get_result(&mut job).await.unwrap();

        let err = client.waiter().poll_once(&mut job).await.unwrap_err();
        assert!(matches!(err, UnderdocError::Protocol(_)));
        assert_eq!(job.status(), JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_get_result_on_inline_job_uses_cached_payload() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(json!({
            "status": "succeeded",
            "result": {"total": 1, "date": "2024-03-03"}
        }))]));
        let client = client(transport.clone());
        let mut job = client.submit_async(&jpeg_2kb()).await.unwrap();

        let first = client.get_result(&mut job).await.unwrap();
        let second = client.get_result(&mut job).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_result_failed_job() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"job_id": "job-4", "status": "queued"})),
            Ok(json!({"job_id": "job-4", "status": "failed", "error": "corrupt image"})),
        ]));
        let client = client(transport);
        let mut job = client.submit_async(&jpeg_2kb()).await.unwrap();
        let err = client.get_result(&mut job).await.unwrap_err();
        assert!(matches!(err, UnderdocError::JobFailed { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let err = Client::with_transport(ClientConfig::new("", "https://x.io"), transport)
            .err()
            .unwrap();
        assert!(matches!(err, UnderdocError::Config(_)));
    }
}
