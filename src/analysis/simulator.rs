//! Simulated analyzer.
//!
//! Produces fabricated verdicts after an artificial delay. Every score is an
//! independent uniform draw from a fixed range; identical inputs give
//! unrelated outputs.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use super::model::{AnalysisResult, AreaKind, DetectionArea, Details, MediaType, WebcamAnalysisResult};
use super::store::{ResultStore, StoredAnalysis};
use super::upload::MediaUpload;
use super::{AnalysisError, AnalysisProvider, ProviderKind, UnknownIdPolicy};

/// Confidence range used when the verdict is "deepfake".
pub const DEEPFAKE_CONFIDENCE: RangeInclusive<f64> = 0.65..=0.95;
/// Confidence range used when the verdict is "authentic".
pub const AUTHENTIC_CONFIDENCE: RangeInclusive<f64> = 0.85..=0.99;

// ---------------------------------------------------------------------------
// Latency
// ---------------------------------------------------------------------------

/// Inclusive delay range in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let hi = self.max_ms.max(self.min_ms);
        Duration::from_millis(rng.gen_range(self.min_ms..=hi))
    }
}

/// Artificial delays per kind of request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyProfile {
    pub image: LatencyRange,
    pub video: LatencyRange,
    pub audio: LatencyRange,
    pub frame: LatencyRange,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            image: LatencyRange::new(1500, 2500),
            video: LatencyRange::new(3000, 5000),
            audio: LatencyRange::new(2000, 3500),
            frame: LatencyRange::new(300, 500),
        }
    }
}

impl LatencyProfile {
    /// No artificial delay at all.
    pub fn instant() -> Self {
        let zero = LatencyRange::new(0, 0);
        Self {
            image: zero,
            video: zero,
            audio: zero,
            frame: zero,
        }
    }

    pub fn for_media(&self, media_type: MediaType) -> LatencyRange {
        match media_type {
            MediaType::Image => self.image,
            MediaType::Video => self.video,
            MediaType::Audio => self.audio,
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Knobs for one kind of fabricated verdict.
struct Recipe {
    deepfake_probability: f64,
    area_count: RangeInclusive<usize>,
    area_kinds: &'static [AreaKind],
    detail_keys: &'static [&'static str],
    /// Upper bound for the `frame` tag on areas (video only).
    frame_span: Option<RangeInclusive<u32>>,
}

const IMAGE_RECIPE: Recipe = Recipe {
    deepfake_probability: 0.3,
    area_count: 1..=3,
    area_kinds: &[
        AreaKind::FacialInconsistency,
        AreaKind::TextureArtifact,
        AreaKind::MetadataMismatch,
    ],
    detail_keys: &[
        "photoshop_detection",
        "gan_detection",
        "metadata_analysis",
        "face_consistency",
        "texture_analysis",
        "edge_artifacts",
    ],
    frame_span: None,
};

const VIDEO_RECIPE: Recipe = Recipe {
    deepfake_probability: 0.3,
    area_count: 1..=3,
    area_kinds: &[
        AreaKind::FacialInconsistency,
        AreaKind::LipSyncMismatch,
        AreaKind::TemporalInconsistency,
    ],
    detail_keys: &[
        "facial_inconsistencies",
        "temporal_analysis",
        "lip_sync_verification",
        "eye_blink_rate",
        "head_pose_estimation",
    ],
    frame_span: Some(20..=100),
};

const AUDIO_RECIPE: Recipe = Recipe {
    deepfake_probability: 0.3,
    area_count: 0..=0,
    area_kinds: &[],
    detail_keys: &[
        "voice_cloning_detection",
        "natural_patterns_analysis",
        "neural_voice_filter",
        "frequency_analysis",
        "speech_consistency",
    ],
    frame_span: None,
};

const FRAME_RECIPE: Recipe = Recipe {
    deepfake_probability: 0.2,
    area_count: 1..=2,
    area_kinds: &[AreaKind::FacialInconsistency, AreaKind::TextureArtifact],
    detail_keys: &[
        "face_consistency",
        "eye_blink_rate",
        "lip_sync",
        "texture_analysis",
        "edge_artifacts",
    ],
    frame_span: None,
};

fn recipe_for(media_type: MediaType) -> &'static Recipe {
    match media_type {
        MediaType::Image => &IMAGE_RECIPE,
        MediaType::Video => &VIDEO_RECIPE,
        MediaType::Audio => &AUDIO_RECIPE,
    }
}

/// The random part of a result, before ids and timings are attached.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub is_deepfake: bool,
    pub confidence: f64,
    pub areas: Vec<DetectionArea>,
    pub details: Details,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn synthesize<R: Rng + ?Sized>(recipe: &Recipe, rng: &mut R) -> Verdict {
    let is_deepfake = rng.gen_bool(recipe.deepfake_probability);
    let confidence = if is_deepfake {
        round2(rng.gen_range(DEEPFAKE_CONFIDENCE))
    } else {
        round2(rng.gen_range(AUTHENTIC_CONFIDENCE))
    };

    let mut areas = Vec::new();
    if is_deepfake && !recipe.area_kinds.is_empty() {
        let total_frames = recipe.frame_span.clone().map(|span| rng.gen_range(span));
        let count = rng.gen_range(recipe.area_count.clone());
        for _ in 0..count {
            let kind = recipe.area_kinds[rng.gen_range(0..recipe.area_kinds.len())];
            areas.push(DetectionArea {
                // Kept near the centre where a face usually is; x + width and
                // y + height stay inside the frame.
                x: rng.gen_range(0.3..=0.7),
                y: rng.gen_range(0.2..=0.6),
                width: rng.gen_range(0.05..=0.2),
                height: rng.gen_range(0.05..=0.2),
                kind,
                confidence: rng.gen_range(0.7..=0.95),
                frame: total_frames.map(|n| rng.gen_range(1..=n)),
            });
        }
    }

    let details = recipe
        .detail_keys
        .iter()
        .map(|key| (key.to_string(), round2(rng.gen_range(0.0..=1.0))))
        .collect();

    Verdict {
        is_deepfake,
        confidence,
        areas,
        details,
    }
}

/// Fabricate a verdict for an uploaded file of the given type.
pub fn synthesize_media<R: Rng + ?Sized>(media_type: MediaType, rng: &mut R) -> Verdict {
    synthesize(recipe_for(media_type), rng)
}

/// Fabricate a verdict for a single webcam frame.
pub fn synthesize_frame<R: Rng + ?Sized>(rng: &mut R) -> Verdict {
    synthesize(&FRAME_RECIPE, rng)
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// A fresh id of the form `<media>-<unix millis>-<7 base36 chars>`.
pub fn mint_analysis_id(media_type: MediaType) -> String {
    format!(
        "{}-{}-{}",
        media_type,
        Utc::now().timestamp_millis(),
        random_suffix()
    )
}

/// A fresh webcam session id.
pub fn mint_session_id() -> String {
    format!("session-{}-{}", Utc::now().timestamp_millis(), random_suffix())
}

/// Decode a frame given either as a `data:image/...;base64,` URL or as bare
/// base64.
pub fn decode_frame(frame_data: &str) -> Result<Vec<u8>, AnalysisError> {
    let encoded = match frame_data.split_once(',') {
        Some((_, payload)) => payload,
        None => frame_data,
    };
    if encoded.trim().is_empty() {
        return Err(AnalysisError::InvalidFrame("empty frame".to_string()));
    }
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| AnalysisError::InvalidFrame(e.to_string()))
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Provider that fabricates results locally and caches them in a
/// `ResultStore`.
pub struct SimulatedProvider {
    store: Arc<ResultStore>,
    latency: LatencyProfile,
    unknown_ids: UnknownIdPolicy,
}

impl SimulatedProvider {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self {
            store,
            latency: LatencyProfile::default(),
            unknown_ids: UnknownIdPolicy::default(),
        }
    }

    pub fn with_latency(mut self, latency: LatencyProfile) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_unknown_id_policy(mut self, policy: UnknownIdPolicy) -> Self {
        self.unknown_ids = policy;
        self
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Run the simulated processing for an already-minted id and store the
    /// result. Used directly by the HTTP layer, which hands out the id
    /// before processing finishes.
    pub async fn process(&self, id: &str, media_type: MediaType, upload: &MediaUpload) -> AnalysisResult {
        let delay = self.latency.for_media(media_type).sample(&mut rand::thread_rng());
        debug!(%id, %media_type, bytes = upload.size(), delay_ms = delay.as_millis() as u64, "simulating analysis");

        let started = Instant::now();
        tokio::time::sleep(delay).await;
        let verdict = synthesize_media(media_type, &mut rand::thread_rng());

        let result = AnalysisResult {
            id: id.to_string(),
            media_type,
            timestamp: Utc::now(),
            is_deepfake: verdict.is_deepfake,
            confidence: verdict.confidence,
            details: verdict.details,
            areas: verdict.areas,
            processing_time: started.elapsed().as_secs_f64(),
        };
        info!(
            %id,
            %media_type,
            is_deepfake = result.is_deepfake,
            confidence = result.confidence,
            "analysis complete"
        );
        self.store.insert(result.clone()).await;
        result
    }

    fn fabricate(&self, id: &str) -> AnalysisResult {
        let media_type = MediaType::from_analysis_id(id);
        let mut rng = rand::thread_rng();
        let verdict = synthesize_media(media_type, &mut rng);
        AnalysisResult {
            id: id.to_string(),
            media_type,
            timestamp: Utc::now(),
            is_deepfake: verdict.is_deepfake,
            confidence: verdict.confidence,
            details: verdict.details,
            areas: verdict.areas,
            processing_time: round2(rng.gen_range(0.5..=2.5)),
        }
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for SimulatedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Simulated
    }

    async fn analyze_media(
        &self,
        media_type: MediaType,
        upload: &MediaUpload,
    ) -> Result<String, AnalysisError> {
        let id = mint_analysis_id(media_type);
        info!(%id, file = %upload.file_name, "analyzing {}", media_type);
        self.process(&id, media_type, upload).await;
        Ok(id)
    }

    async fn analyze_frame(
        &self,
        frame_data: &str,
        session_id: Option<&str>,
    ) -> Result<WebcamAnalysisResult, AnalysisError> {
        let session_id = session_id.map(str::to_string).unwrap_or_else(mint_session_id);
        let delay = self.latency.frame.sample(&mut rand::thread_rng());
        debug!(%session_id, chars = frame_data.len(), "analyzing webcam frame");

        let started = Instant::now();
        tokio::time::sleep(delay).await;
        let verdict = synthesize_frame(&mut rand::thread_rng());
        let frames_analyzed = self.store.next_frame(&session_id).await;

        let result = WebcamAnalysisResult {
            session_id,
            is_deepfake: verdict.is_deepfake,
            confidence: verdict.confidence,
            areas: verdict.areas,
            details: verdict.details,
            processing_time: started.elapsed().as_secs_f64(),
            frames_analyzed,
        };
        self.store.record_frame_result(&result).await;
        Ok(result)
    }

    async fn get_result(&self, id: &str) -> Result<AnalysisResult, AnalysisError> {
        match self.store.get(id).await {
            Some(StoredAnalysis::Ready(result)) => Ok(result),
            Some(StoredAnalysis::Pending { .. }) => Err(AnalysisError::Pending(id.to_string())),
            None => match self.unknown_ids {
                UnknownIdPolicy::Fabricate => {
                    debug!(%id, "unknown analysis id, fabricating result");
                    Ok(self.fabricate(id))
                }
                UnknownIdPolicy::NotFound => Err(AnalysisError::NotFound(id.to_string())),
            },
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
                Err(AnalysisError::Pending(_)) => {
                    debug!(%id, attempt, "result not ready yet");
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
