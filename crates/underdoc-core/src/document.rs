use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, UnderdocError};

/// Image encodings accepted by the extraction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Parses a MIME type such as `image/jpeg; charset=binary`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Guesses the format from the extension of a path or URL.
    pub fn from_path_like(name: &str) -> Option<Self> {
        let name = name.split(['?', '#']).next().unwrap_or(name);
        let (_, ext) = name.rsplit_once('.')?;
        if ext.contains('/') {
            return None;
        }
        Self::from_extension(ext)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document image plus what the caller declares about it.
///
/// Nothing is checked at construction time; [`DocumentInput::validate`] runs
/// before submission so that bad input never costs a network round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInput {
    bytes: Vec<u8>,
    mime_type: String,
    metadata: BTreeMap<String, String>,
    source: Option<String>,
}

impl DocumentInput {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            metadata: BTreeMap::new(),
            source: None,
        }
    }

    /// Reads an image from disk, inferring the MIME type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .ok_or_else(|| {
                UnderdocError::Validation(format!("unsupported file format: {display}"))
            })?;

        let bytes = tokio::fs::read(path).await.map_err(|source| UnderdocError::Io {
            path: display.clone(),
            source,
        })?;

        Ok(Self::new(bytes, format.mime_type()).with_source(display))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Where the document came from (file path, URL), if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Checks emptiness, size and declared type, returning the wire format.
    pub fn validate(&self, max_bytes: usize) -> Result<ImageFormat> {
        if self.bytes.is_empty() {
            return Err(UnderdocError::Validation("document is empty".into()));
        }
        if self.bytes.len() > max_bytes {
            return Err(UnderdocError::Validation(format!(
                "document is {} bytes, maximum is {max_bytes}",
                self.bytes.len()
            )));
        }
        ImageFormat::from_mime(&self.mime_type).ok_or_else(|| {
            UnderdocError::Validation(format!("unsupported MIME type: {}", self.mime_type))
        })
    }
}

/// Expands a glob pattern (`receipts/*.jpg`, `scans/**/*`) to the files it
/// matches that carry a supported image extension, in path order. Entries
/// that cannot be read while walking are skipped.
pub fn paths_matching(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).map_err(|e| {
        UnderdocError::Validation(format!("invalid file pattern {pattern:?}: {e}"))
    })?;

    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .and_then(ImageFormat::from_extension)
                .is_some()
        })
        .collect())
}
