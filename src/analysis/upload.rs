//! Uploaded media payloads and the checks applied before submission.

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use thiserror::Error;

use super::model::MediaType;
use crate::notify::Notice;

/// Default upload ceiling: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("invalid file type '{got}': expected {}*", .expected.mime_prefix())]
    InvalidType { expected: MediaType, got: String },

    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

impl UploadError {
    /// The notice shown when a file is rejected.
    pub fn notice(&self) -> Notice {
        match self {
            UploadError::InvalidType { expected, .. } => {
                let hint = match expected {
                    MediaType::Image => "an image file (JPEG, PNG, etc.)",
                    MediaType::Video => "a video file (MP4, WebM, etc.)",
                    MediaType::Audio => "an audio file (MP3, WAV, etc.)",
                };
                Notice::destructive("Invalid File", format!("Please select {}", hint))
            }
            UploadError::TooLarge { limit, .. } => Notice::destructive(
                "File Too Large",
                format!("Maximum file size is {}MB", limit / (1024 * 1024)),
            ),
        }
    }
}

/// A file handed to the analysis client.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl MediaUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = guess_content_type(path).to_string();
        Ok(Self::new(file_name, content_type, data))
    }

    /// Check MIME prefix and size for the given flow.
    pub fn validate(&self, media_type: MediaType, max_bytes: u64) -> Result<(), UploadError> {
        if !self.content_type.starts_with(media_type.mime_prefix()) {
            return Err(UploadError::InvalidType {
                expected: media_type,
                got: self.content_type.clone(),
            });
        }
        if self.size() > max_bytes {
            return Err(UploadError::TooLarge {
                size: self.size(),
                limit: max_bytes,
            });
        }
        Ok(())
    }
}

/// Extension-based MIME lookup for the formats the demo accepts.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
