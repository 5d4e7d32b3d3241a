use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use tracing::{debug, info, instrument};

use underdoc_core::document::{DocumentInput, ImageFormat};
use underdoc_core::error::{Result, UnderdocError};

use crate::batch::{BatchInput, BatchItem, BatchMode};
use crate::client::Client;

/// `s3://bucket/key`, used as the source label of S3 documents.
pub fn object_url(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

/// Splits `s3://bucket` or `s3://bucket/key` into its bucket and optional key.
pub fn parse_s3_url(url: &str) -> Option<(String, Option<String>)> {
    let rest = url.strip_prefix("s3://")?;
    let (bucket, key) = match rest.split_once('/') {
        Some((bucket, key)) => (bucket, Some(key).filter(|k| !k.is_empty())),
        None => (rest, None),
    };
    if bucket.is_empty() {
        return None;
    }
    Some((bucket.to_string(), key.map(str::to_string)))
}

fn is_image_key(key: &str) -> bool {
    ImageFormat::from_path_like(key).is_some()
}

fn storage_error<E>(location: String, e: E) -> UnderdocError
where
    E: std::error::Error,
{
    UnderdocError::Storage {
        location,
        message: DisplayErrorContext(e).to_string(),
    }
}

/// Reads documents from S3 buckets.
#[derive(Debug, Clone)]
pub struct S3Source {
    client: aws_sdk_s3::Client,
}

impl S3Source {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Credentials and region from the standard AWS environment and profile.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config))
    }

    /// Downloads one object. The format comes from the key's extension, else
    /// the object's `Content-Type`.
    #[instrument(skip(self))]
    pub async fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
        max_bytes: usize,
    ) -> Result<DocumentInput> {
        let location = object_url(bucket, key);

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error(location.clone(), e))?;

        let format = ImageFormat::from_path_like(key)
            .or_else(|| output.content_type().and_then(ImageFormat::from_mime))
            .ok_or_else(|| {
                UnderdocError::Validation(format!("unsupported image format: {location}"))
            })?;

        if let Some(declared) = output.content_length() {
            if u64::try_from(declared).is_ok_and(|declared| declared > max_bytes as u64) {
                return Err(UnderdocError::Validation(format!(
                    "{location} is {declared} bytes, maximum is {max_bytes}"
                )));
            }
        }

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| storage_error(location.clone(), e))?
            .into_bytes();

        debug!(bytes = bytes.len(), format = %format, "Downloaded object");
        Ok(DocumentInput::new(bytes.to_vec(), format.mime_type()).with_source(location))
    }

    /// Keys of every image object in `bucket`, following pagination.
    #[instrument(skip(self))]
    pub async fn list_images(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| storage_error(format!("s3://{bucket}"), e))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| is_image_key(key))
                    .map(str::to_string),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        info!(bucket, count = keys.len(), "Listed image objects");
        Ok(keys)
    }
}

impl Client {
    /// Extracts every image object in an S3 bucket. Fails only if the bucket
    /// cannot be listed.
    pub async fn extract_s3_bucket(
        &self,
        source: &S3Source,
        bucket: &str,
        mode: BatchMode,
    ) -> Result<Vec<BatchItem>> {
        let inputs = source
            .list_images(bucket)
            .await?
            .into_iter()
            .map(|key| BatchInput::S3Object {
                source: source.clone(),
                bucket: bucket.to_string(),
                key,
            })
            .collect();
        Ok(self.extract_inputs(inputs, mode).await)
    }
}
