//! Client-side entry points used by the upload and webcam flows.
//!
//! Files are validated here, before any provider call; rejected files
//! never reach the provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::model::{AnalysisResult, MediaType, WebcamAnalysisResult};
use super::upload::{MediaUpload, MAX_UPLOAD_BYTES};
use super::{AnalysisError, AnalysisProvider};
use crate::notify::Notice;

/// Default polling parameters for `poll_for_analysis_result`.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Clone)]
pub struct AnalysisClient {
    provider: Arc<dyn AnalysisProvider>,
    max_upload_bytes: u64,
    poll_attempts: u32,
    poll_interval: Duration,
    notices: broadcast::Sender<Notice>,
}

impl AnalysisClient {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        let (notices, _) = broadcast::channel(32);
        Self {
            provider,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            notices,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Polling used by `analyze_and_wait`.
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    pub fn provider(&self) -> &Arc<dyn AnalysisProvider> {
        &self.provider
    }

    /// Receive the notices raised by this client.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            warn!(title = %notice.title, "{}", notice.description);
        } else {
            info!(title = %notice.title, "{}", notice.description);
        }
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    async fn submit(&self, media_type: MediaType, upload: &MediaUpload) -> Result<String, AnalysisError> {
        if let Err(e) = upload.validate(media_type, self.max_upload_bytes) {
            self.notify(e.notice());
            return Err(e.into());
        }
        self.notify(Notice::info(
            format!("Processing {}", capitalize(media_type.as_str())),
            "Uploading and preparing for analysis...",
        ));
        let id = self.provider.analyze_media(media_type, upload).await?;
        self.notify(Notice::info(
            "Analysis Started",
            format!("Your {} is being analyzed for deepfakes...", media_type),
        ));
        Ok(id)
    }

    pub async fn analyze_image(&self, upload: &MediaUpload) -> Result<String, AnalysisError> {
        self.submit(MediaType::Image, upload).await
    }

    pub async fn analyze_video(&self, upload: &MediaUpload) -> Result<String, AnalysisError> {
        self.submit(MediaType::Video, upload).await
    }

    pub async fn analyze_audio(&self, upload: &MediaUpload) -> Result<String, AnalysisError> {
        self.submit(MediaType::Audio, upload).await
    }

    pub async fn analyze_webcam_frame(
        &self,
        frame_data: &str,
        session_id: Option<&str>,
    ) -> Result<WebcamAnalysisResult, AnalysisError> {
        self.provider.analyze_frame(frame_data, session_id).await
    }

    pub async fn get_analysis_result(&self, id: &str) -> Result<AnalysisResult, AnalysisError> {
        self.provider.get_result(id).await
    }

    pub async fn poll_for_analysis_result(
        &self,
        id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.provider.poll_for_result(id, max_attempts, interval).await
    }

    /// Full upload flow: validate, submit, poll, and announce the verdict.
    pub async fn analyze_and_wait(
        &self,
        media_type: MediaType,
        upload: &MediaUpload,
    ) -> Result<AnalysisResult, AnalysisError> {
        let outcome: Result<AnalysisResult, AnalysisError> = async {
            let id = self.submit(media_type, upload).await?;
            self.poll_for_analysis_result(&id, self.poll_attempts, self.poll_interval)
                .await
        }
        .await;

        match &outcome {
            Ok(result) => {
                let description = if result.is_deepfake {
                    format!("Potential deepfake detected in the {}", media_type)
                } else {
                    format!("No manipulation detected in the {}", media_type)
                };
                let notice = if result.is_deepfake {
                    Notice::destructive("Analysis Complete", description)
                } else {
                    Notice::info("Analysis Complete", description)
                };
                self.notify(notice);
            }
            // Validation failures were already announced.
            Err(AnalysisError::Upload(_)) => {}
            Err(e) => self.notify(e.notice(media_type)),
        }
        outcome
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
