//! Provider that forwards requests to a running analysis API over HTTP.

use std::time::Duration;

use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::{AnalysisResult, MediaType, WebcamAnalysisResult};
use super::upload::MediaUpload;
use super::{AnalysisError, AnalysisProvider, ProviderKind};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    analysis_id: String,
}

#[derive(Debug, Serialize)]
struct FrameRequest<'a> {
    frame_data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

pub struct RemoteHttpProvider {
    client: Client,
    base_url: String,
}

impl RemoteHttpProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn error_from(response: reqwest::Response) -> AnalysisError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
        AnalysisError::Remote { status, message }
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for RemoteHttpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    async fn analyze_media(
        &self,
        media_type: MediaType,
        upload: &MediaUpload,
    ) -> Result<String, AnalysisError> {
        let part = multipart::Part::bytes(upload.data.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = multipart::Form::new().part("file", part);

        let url = self.url(&format!("/api/analyze/{}", media_type));
        debug!(%url, file = %upload.file_name, "submitting upload");
        let response = self.client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let body: SubmitResponse = response.json().await?;
        Ok(body.analysis_id)
    }

    async fn analyze_frame(
        &self,
        frame_data: &str,
        session_id: Option<&str>,
    ) -> Result<WebcamAnalysisResult, AnalysisError> {
        let response = self
            .client
            .post(self.url("/api/analyze/webcam"))
            .json(&FrameRequest {
                frame_data,
                session_id,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(response.json().await?)
    }

    async fn get_result(&self, id: &str) -> Result<AnalysisResult, AnalysisError> {
        let response = self
            .client
            .get(self.url(&format!("/api/analysis/{}", id)))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::ACCEPTED => Err(AnalysisError::Pending(id.to_string())),
            StatusCode::NOT_FOUND => Err(AnalysisError::NotFound(id.to_string())),
            _ => Err(Self::error_from(response).await),
        }
    }

    async fn poll_for_result(
        &self,
        id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<AnalysisResult, AnalysisError> {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            tokio::time::sleep(interval).await;
            match self.get_result(id).await {
                Err(AnalysisError::Pending(_)) => debug!(%id, attempt, "still processing"),
                Err(AnalysisError::Transport(e)) if attempt < attempts => {
                    warn!(%id, attempt, error = %e, "poll request failed, retrying");
                }
                other => return other,
            }
        }
        Err(AnalysisError::TimedOut {
            id: id.to_string(),
            attempts,
        })
    }
}
