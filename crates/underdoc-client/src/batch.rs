use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use underdoc_core::document::{self, DocumentInput};
use underdoc_core::error::Result;
use underdoc_core::result::ExtractionResult;

use crate::client::Client;
#[cfg(feature = "s3")]
use crate::s3::{object_url, S3Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// One document at a time, in order.
    Sequential,
    /// Up to `concurrency` extractions in flight.
    Parallel { concurrency: usize },
}

impl Default for BatchMode {
    fn default() -> Self {
        Self::Parallel { concurrency: 4 }
    }
}

/// One entry of a batch. Anything not already in memory is loaded by the
/// task that extracts it, so a large batch never holds every image at once.
#[derive(Debug, Clone)]
pub enum BatchInput {
    Document(DocumentInput),
    Path(PathBuf),
    Url(String),
    #[cfg(feature = "s3")]
    S3Object {
        source: S3Source,
        bucket: String,
        key: String,
    },
}

impl BatchInput {
    fn label(&self, index: usize) -> String {
        match self {
            Self::Document(document) => document
                .source()
                .map(str::to_string)
                .unwrap_or_else(|| format!("document #{index}")),
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
            #[cfg(feature = "s3")]
            Self::S3Object { bucket, key, .. } => object_url(bucket, key),
        }
    }

    /// Reads the document into memory.
    pub async fn load(self, client: &Client) -> Result<DocumentInput> {
        match self {
            Self::Document(document) => Ok(document),
            Self::Path(path) => DocumentInput::from_path(path).await,
            Self::Url(url) => client.fetch_document(&url).await,
            #[cfg(feature = "s3")]
            Self::S3Object {
                source,
                bucket,
                key,
            } => {
                source
                    .fetch_object(&bucket, &key, client.max_document_bytes())
                    .await
            }
        }
    }
}

impl From<DocumentInput> for BatchInput {
    fn from(document: DocumentInput) -> Self {
        Self::Document(document)
    }
}

/// Outcome for one document of a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub source: String,
    pub outcome: Result<ExtractionResult>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl Client {
    /// Extracts every document; one failure does not stop the others.
    /// Items come back in input order.
    pub async fn extract_batch(
        &self,
        documents: Vec<DocumentInput>,
        mode: BatchMode,
    ) -> Vec<BatchItem> {
        let inputs = documents.into_iter().map(BatchInput::from).collect();
        self.extract_inputs(inputs, mode).await
    }

    /// Extracts every image file matching a glob pattern such as
    /// `receipts/*.jpg`. Fails only if the pattern itself is malformed.
    pub async fn extract_pattern(
        &self,
        pattern: &str,
        mode: BatchMode,
    ) -> Result<Vec<BatchItem>> {
        let paths = document::paths_matching(pattern)?;
        info!(pattern, matched = paths.len(), "Expanded file pattern");
        let inputs = paths.into_iter().map(BatchInput::Path).collect();
        Ok(self.extract_inputs(inputs, mode).await)
    }

    /// Loads and extracts each input. A load failure is reported on that
    /// input's item like any extraction failure.
    pub async fn extract_inputs(
        &self,
        inputs: Vec<BatchInput>,
        mode: BatchMode,
    ) -> Vec<BatchItem> {
        let total = inputs.len();
        info!(count = total, mode = ?mode, "Starting batch extraction");

        let items = match mode {
            BatchMode::Sequential => {
                let mut items = Vec::with_capacity(total);
                for (i, input) in inputs.into_iter().enumerate() {
                    items.push(self.extract_one(i, input).await);
                }
                items
            }
            BatchMode::Parallel { concurrency } => {
                self.extract_parallel(inputs, concurrency.max(1)).await
            }
        };

        let failed = items.iter().filter(|item| !item.is_ok()).count();
        if failed > 0 {
            warn!(
                succeeded = total - failed,
                failed, "Batch extraction completed with failures"
            );
        } else {
            info!(count = total, "Batch extraction completed successfully");
        }
        items
    }

    async fn extract_one(&self, index: usize, input: BatchInput) -> BatchItem {
        let source = input.label(index);
        let outcome = match input.load(self).await {
            Ok(document) => self.extract(&document).await,
            Err(e) => Err(e),
        };
        BatchItem { source, outcome }
    }

    async fn extract_parallel(
        &self,
        inputs: Vec<BatchInput>,
        concurrency: usize,
    ) -> Vec<BatchItem> {
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut join_set = JoinSet::new();

        for (i, input) in inputs.into_iter().enumerate() {
            let client = self.clone();
            let permits = permits.clone();
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (i, client.extract_one(i, input).await)
            });
        }

        let mut slots: Vec<Option<BatchItem>> = Vec::new();
        slots.resize_with(join_set.len(), || None);

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((i, item)) => {
                    if let Err(e) = &item.outcome {
                        error!(
                            document_index = i,
                            source = %item.source,
                            error = %e,
                            "Extraction failed for document in batch"
                        );
                    }
                    slots[i] = Some(item);
                }
                Err(join_err) if join_err.is_panic() => {
                    error!(error = %join_err, "Task panicked during batch extraction");
                    std::panic::resume_unwind(join_err.into_panic());
                }
                Err(join_err) => {
                    error!(error = %join_err, "Batch task was cancelled");
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use std::time::Duration;
    use underdoc_core::config::ClientConfig;
    use underdoc_core::error::UnderdocError;
    use underdoc_core::schema::{ExtractionSchema, FieldType};

    fn client(transport: Arc<ScriptedTransport>) -> Client {
        let config = ClientConfig::new("key", "https://api.example.com")
            .with_request_timeout(Duration::from_millis(500))
            .with_schema(ExtractionSchema::new().required("total", FieldType::Number));
        Client::with_transport(config, transport).unwrap()
    }

    #[tokio::test]
    async fn test_sequential_batch_keeps_order_and_failures() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json!({"status": "succeeded", "result": {"total": 1}})),
            Ok(json!({"status": "succeeded", "result": {"total": 2}})),
        ]));
        let documents = vec![
            DocumentInput::new(vec![1], "image/png").with_source("a.png"),
            DocumentInput::new(vec![1], "image/gif").with_source("b.gif"),
            DocumentInput::new(vec![1], "image/png"),
        ];

        let items = client(transport.clone())
            .extract_batch(documents, BatchMode::Sequential)
            .await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].source, "a.png");
        assert_eq!(items[0].outcome.as_ref().unwrap().number("total"), Some(1.0));
        assert!(matches!(items[1].outcome, Err(UnderdocError::Validation(_))));
        assert_eq!(items[2].source, "document #2");
        assert_eq!(items[2].outcome.as_ref().unwrap().number("total"), Some(2.0));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_parallel_batch_returns_every_item_in_order() {
        let transport = Arc::new(ScriptedTransport::repeating(
            json!({"status": "succeeded", "result": {"total": 7}}),
        ));
        let documents = (0..6)
            .map(|i| DocumentInput::new(vec![1], "image/jpeg").with_source(format!("{i}.jpg")))
            .collect();

        let items = client(transport.clone())
            .extract_batch(documents, BatchMode::Parallel { concurrency: 2 })
            .await;

        assert_eq!(items.len(), 6);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.source, format!("{i}.jpg"));
            assert!(item.is_ok());
        }
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test]
    async fn test_pattern_batch_extracts_matching_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "readme.md"] {
            std::fs::write(dir.path().join(name), [0xFF, 0xD8, 0xFF]).unwrap();
        }
        let transport = Arc::new(ScriptedTransport::repeating(
            json!({"status": "succeeded", "result": {"total": 3}}),
        ));

        let pattern = format!("{}/*", dir.path().display());
        let items = client(transport.clone())
            .extract_pattern(&pattern, BatchMode::default())
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert!(items[0].source.ends_with("a.jpg"));
        assert!(items[1].source.ends_with("b.png"));
        assert!(items.iter().all(BatchItem::is_ok));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_pattern_without_matches_is_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));

        let pattern = format!("{}/*.png", dir.path().display());
        let items = client(transport.clone())
            .extract_pattern(&pattern, BatchMode::Sequential)
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_path_fails_only_its_item() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.jpg");
        std::fs::write(&present, [0xFF, 0xD8, 0xFF]).unwrap();
        let transport = Arc::new(ScriptedTransport::repeating(
            json!({"status": "succeeded", "result": {"total": 1}}),
        ));

        let inputs = vec![
            BatchInput::Path(dir.path().join("missing.jpg")),
            BatchInput::Path(present),
        ];
        let items = client(transport.clone())
            .extract_inputs(inputs, BatchMode::Parallel { concurrency: 2 })
            .await;

        assert!(matches!(items[0].outcome, Err(UnderdocError::Io { .. })));
        assert!(items[1].is_ok());
        assert_eq!(transport.calls(), 1);
    }
}
