//! Content units sent to a contact

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of a single outbound content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Image,
    Document,
    Text,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Image => "image",
            ContentKind::Document => "document",
            ContentKind::Text => "text",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file loaded into memory for sending
///
/// The bytes are shared, so cloning a `MediaFile` for every contact of a run
/// does not copy the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaFile {
    file_name: String,
    mime_type: String,
    data: Arc<[u8]>,
}

impl MediaFile {
    /// Read a file from disk, guessing its MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::MediaUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        Ok(Self::from_bytes(file_name, data))
    }

    pub fn from_bytes(file_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let data: Vec<u8> = data.into();
        Self {
            file_name,
            mime_type,
            data: Arc::from(data),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload encoded as standard base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// One outbound unit: a captioned image, a captioned document, or plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Image { media: MediaFile, caption: String },
    Document { media: MediaFile, caption: String },
    Text { body: String },
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Image { .. } => ContentKind::Image,
            Content::Document { .. } => ContentKind::Document,
            Content::Text { .. } => ContentKind::Text,
        }
    }

    pub fn media(&self) -> Option<&MediaFile> {
        match self {
            Content::Image { media, .. } | Content::Document { media, .. } => Some(media),
            Content::Text { .. } => None,
        }
    }

    /// Caption for media, body for text
    pub fn text(&self) -> &str {
        match self {
            Content::Image { caption, .. } | Content::Document { caption, .. } => caption,
            Content::Text { body } => body,
        }
    }
}
