//! Analysis providers: the simulated analyzer and the remote HTTP client.
//!
//! Callers talk to an `AnalysisProvider`; which variant backs it is decided
//! once, when the provider is built from configuration.

pub mod client;
pub mod model;
pub mod remote;
pub mod simulator;
pub mod store;
pub mod upload;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::client::AnalysisClient;
pub use self::model::{AnalysisResult, AreaKind, DetectionArea, MediaType, WebcamAnalysisResult};
pub use self::remote::RemoteHttpProvider;
pub use self::simulator::{LatencyProfile, SimulatedProvider};
pub use self::store::ResultStore;
pub use self::upload::{MediaUpload, UploadError};

use crate::config::AnalysisConfig;
use crate::notify::Notice;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("analysis '{0}' not found")]
    NotFound(String),

    #[error("analysis '{0}' is still processing")]
    Pending(String),

    #[error("analysis '{id}' not ready after {attempts} attempts")]
    TimedOut { id: String, attempts: u32 },

    #[error("invalid frame data: {0}")]
    InvalidFrame(String),

    #[error("remote analysis service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("request to analysis service failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AnalysisError {
    /// The notice shown when an upload analysis does not complete.
    pub fn notice(&self, media_type: MediaType) -> Notice {
        match self {
            AnalysisError::Upload(e) => e.notice(),
            _ => Notice::destructive(
                "Analysis Failed",
                format!("Failed to analyze the {}. Please try again.", media_type),
            ),
        }
    }
}

/// What to do when a result is requested for an id the store has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownIdPolicy {
    /// Synthesize a plausible result on the spot.
    #[default]
    Fabricate,
    /// Report `AnalysisError::NotFound`.
    NotFound,
}

/// Which provider backs the analysis client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Simulated,
    Remote,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Simulated => write!(f, "simulated"),
            ProviderKind::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "simulation" | "sim" => Ok(ProviderKind::Simulated),
            "remote" | "http" => Ok(ProviderKind::Remote),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// A source of analysis results.
#[async_trait::async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Submit an uploaded file. Resolves to the analysis id once the
    /// submission has been accepted.
    async fn analyze_media(
        &self,
        media_type: MediaType,
        upload: &MediaUpload,
    ) -> Result<String, AnalysisError>;

    /// Analyze one webcam frame (a JPEG data URL or bare base64). A new
    /// session is started when `session_id` is `None`.
    async fn analyze_frame(
        &self,
        frame_data: &str,
        session_id: Option<&str>,
    ) -> Result<WebcamAnalysisResult, AnalysisError>;

    async fn get_result(&self, id: &str) -> Result<AnalysisResult, AnalysisError>;

    /// Wait for a result to become available, checking at most
    /// `max_attempts` times `interval` apart.
    async fn poll_for_result(
        &self,
        id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<AnalysisResult, AnalysisError>;
}

/// Build the provider selected in configuration.
pub fn build_provider(
    config: &AnalysisConfig,
    store: Arc<ResultStore>,
) -> anyhow::Result<Arc<dyn AnalysisProvider>> {
    let provider: Arc<dyn AnalysisProvider> = match config.provider {
        ProviderKind::Simulated => Arc::new(
            SimulatedProvider::new(store)
                .with_latency(config.latency.clone())
                .with_unknown_id_policy(config.unknown_id_policy),
        ),
        ProviderKind::Remote => {
            let base_url = config.api_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("remote provider selected but no API_URL configured")
            })?;
            Arc::new(RemoteHttpProvider::new(base_url, config.request_timeout())?)
        }
    };
    tracing::info!(provider = %provider.kind(), "analysis provider ready");
    Ok(provider)
}
