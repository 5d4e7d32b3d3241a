use reqwest::Client;
use tracing::{debug, instrument};

use underdoc_core::document::{DocumentInput, ImageFormat};
use underdoc_core::error::{Result, UnderdocError};

/// Downloads an image to submit. The API key is never sent to third-party
/// hosts; the format comes from `Content-Type`, else the URL extension.
/// Downloads larger than `max_bytes` are abandoned without being buffered.
#[instrument(skip(client))]
pub async fn fetch_document(
    client: &Client,
    url: &str,
    max_bytes: usize,
) -> Result<DocumentInput> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| UnderdocError::TransientNetwork {
            attempts: 1,
            message: format!("could not download {url}: {e}"),
            source: Some(e),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(UnderdocError::Validation(format!(
            "downloading {url} returned HTTP {status}"
        )));
    }

    let format = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(ImageFormat::from_mime)
        .or_else(|| ImageFormat::from_path_like(url))
        .ok_or_else(|| UnderdocError::Validation(format!("unsupported image format: {url}")))?;

    if let Some(declared) = response.content_length() {
        if declared > max_bytes as u64 {
            return Err(too_large(url, max_bytes));
        }
    }

    let mut bytes = Vec::new();
    loop {
        let chunk = response.chunk().await.map_err(|e| UnderdocError::TransientNetwork {
            attempts: 1,
            message: format!("could not read {url}: {e}"),
            source: Some(e),
        })?;
        let Some(chunk) = chunk else { break };
        if bytes.len() + chunk.len() > max_bytes {
            return Err(too_large(url, max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }

    debug!(bytes = bytes.len(), format = %format, "Downloaded document");
    Ok(DocumentInput::new(bytes, format.mime_type()).with_source(url))
}

fn too_large(url: &str, max_bytes: usize) -> UnderdocError {
    UnderdocError::Validation(format!(
        "download from {url} exceeds the maximum of {max_bytes} bytes"
    ))
}
