//! Result types shared by the providers, the webcam loop and the API.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media submitted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Image, MediaType::Video, MediaType::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }

    /// MIME prefix an upload must carry for this media type (`image/` etc).
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            MediaType::Image => "image/",
            MediaType::Video => "video/",
            MediaType::Audio => "audio/",
        }
    }

    /// Infer the media type from an analysis id such as `video-1712-abc`.
    /// Ids without a recognised prefix are treated as images.
    pub fn from_analysis_id(id: &str) -> Self {
        if id.starts_with("video-") {
            MediaType::Video
        } else if id.starts_with("audio-") {
            MediaType::Audio
        } else {
            MediaType::Image
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "audio" => Ok(MediaType::Audio),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// Tag describing why a region was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    FacialInconsistency,
    TextureArtifact,
    MetadataMismatch,
    LipSyncMismatch,
    TemporalInconsistency,
    #[serde(other)]
    Other,
}

impl AreaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AreaKind::FacialInconsistency => "facial_inconsistency",
            AreaKind::TextureArtifact => "texture_artifact",
            AreaKind::MetadataMismatch => "metadata_mismatch",
            AreaKind::LipSyncMismatch => "lip_sync_mismatch",
            AreaKind::TemporalInconsistency => "temporal_inconsistency",
            AreaKind::Other => "other",
        }
    }
}

impl fmt::Display for AreaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flagged rectangle, normalized to the frame (all coordinates in `[0,1]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionArea {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "type")]
    pub kind: AreaKind,
    pub confidence: f64,
    /// Frame index the region was found in (video only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
}

impl DetectionArea {
    /// True when the rectangle lies entirely inside the unit square.
    pub fn is_normalized(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.x)
            && unit.contains(&self.y)
            && unit.contains(&self.width)
            && unit.contains(&self.height)
            && self.x + self.width <= 1.0
            && self.y + self.height <= 1.0
    }
}

/// Named sub-scores, each in `[0,1]`.
pub type Details = BTreeMap<String, f64>;

/// Outcome of an uploaded media analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub media_type: MediaType,
    pub timestamp: DateTime<Utc>,
    pub is_deepfake: bool,
    pub confidence: f64,
    pub details: Details,
    #[serde(default)]
    pub areas: Vec<DetectionArea>,
    /// Seconds spent "processing".
    pub processing_time: f64,
}

/// Outcome of a single webcam frame analysis within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebcamAnalysisResult {
    pub session_id: String,
    pub is_deepfake: bool,
    pub confidence: f64,
    #[serde(default)]
    pub areas: Vec<DetectionArea>,
    pub details: Details,
    pub processing_time: f64,
    pub frames_analyzed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_id_prefix() {
        assert_eq!(MediaType::from_analysis_id("video-1-abc"), MediaType::Video);
        assert_eq!(MediaType::from_analysis_id("audio-1-abc"), MediaType::Audio);
        assert_eq!(MediaType::from_analysis_id("image-1-abc"), MediaType::Image);
        assert_eq!(MediaType::from_analysis_id("whatever"), MediaType::Image);
    }

    #[test]
    fn test_area_kind_wire_names() {
        let area = DetectionArea {
            x: 0.1,
            y: 0.2,
            width: 0.3,
            height: 0.4,
            kind: AreaKind::TextureArtifact,
            confidence: 0.8,
            frame: None,
        };
        let json = serde_json::to_value(&area).unwrap();
        assert_eq!(json["type"], "texture_artifact");
        assert!(json.get("frame").is_none());

        let parsed: DetectionArea = serde_json::from_str(
            r#"{"x":0,"y":0,"width":0.1,"height":0.1,"type":"glitch","confidence":0.5}"#,
        )
        .unwrap();
        assert_eq!(parsed.kind, AreaKind::Other);
    }

    #[test]
    fn test_is_normalized_rejects_overflow() {
        let mut area = DetectionArea {
            x: 0.9,
            y: 0.1,
            width: 0.2,
            height: 0.1,
            kind: AreaKind::Other,
            confidence: 0.9,
            frame: None,
        };
        assert!(!area.is_normalized());
        area.x = 0.7;
        assert!(area.is_normalized());
    }
}
