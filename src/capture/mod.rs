//! Media capture adapter.
//!
//! Owns the camera stream exclusively: acquiring and releasing the device
//! happens only here. Frames are sampled on demand and JPEG-encoded at the
//! stream's native resolution.

pub mod synthetic;

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::analysis::upload::MediaUpload;
use crate::notify::Notice;

pub use self::synthetic::SyntheticCamera;

/// JPEG quality used for captured stills.
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the user.
    #[default]
    User,
    Environment,
}

/// Requested stream shape. Width and height are targets, not hard limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing_mode: FacingMode::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    DeviceNotFound,
    #[error("camera device is busy")]
    DeviceBusy,
    #[error("requested constraints cannot be satisfied")]
    ConstraintsUnsatisfiable,
    #[error("camera capture is not supported on this platform")]
    Unsupported,
}

impl CaptureError {
    /// Message shown to the user; distinct for every failure mode.
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => {
                "Camera access was denied. Please allow camera access and try again."
            }
            CaptureError::DeviceNotFound => {
                "No camera detected. Please connect a camera and try again."
            }
            CaptureError::DeviceBusy => "Camera is already in use by another application.",
            CaptureError::ConstraintsUnsatisfiable => {
                "Camera doesn't meet the required constraints."
            }
            CaptureError::Unsupported => {
                "No camera available or camera access is not supported on this platform."
            }
        }
    }

    pub fn notice(&self) -> Notice {
        Notice::destructive("Webcam Error", self.user_message())
    }
}

impl FromStr for CaptureError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "permission-denied" | "denied" => Ok(CaptureError::PermissionDenied),
            "device-not-found" | "not-found" => Ok(CaptureError::DeviceNotFound),
            "device-busy" | "busy" => Ok(CaptureError::DeviceBusy),
            "constraints-unsatisfiable" | "overconstrained" => {
                Ok(CaptureError::ConstraintsUnsatisfiable)
            }
            "unsupported" => Ok(CaptureError::Unsupported),
            other => Err(format!("unknown capture error '{}'", other)),
        }
    }
}

/// The hardware seam: something that can hand out camera streams.
#[async_trait::async_trait]
pub trait CameraBackend: Send + Sync {
    /// Request access to a camera matching `constraints`.
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// A live camera stream.
pub trait CameraStream: Send {
    /// Native resolution of the delivered frames.
    fn resolution(&self) -> (u32, u32);

    /// The frame currently being displayed, if one is available.
    fn grab(&mut self) -> Option<RgbImage>;

    /// Release the underlying tracks.
    fn stop(&mut self);
}

/// A JPEG still sampled from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub jpeg: Bytes,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    /// `data:image/jpeg;base64,...`
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.jpeg))
    }

    /// Package the still as an image upload (used for saving snapshots).
    pub fn to_upload(&self) -> MediaUpload {
        let name = format!(
            "satya-detection-{}.jpg",
            self.captured_at.format("%Y%m%dT%H%M%S%.3fZ")
        );
        MediaUpload::new(name, "image/jpeg", self.jpeg.clone())
    }
}

impl fmt::Display for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} jpeg ({} bytes)", self.width, self.height, self.jpeg.len())
    }
}

pub struct MediaCapture {
    backend: Arc<dyn CameraBackend>,
    constraints: CaptureConstraints,
    stream: Mutex<Option<Box<dyn CameraStream>>>,
}

impl MediaCapture {
    pub fn new(backend: Arc<dyn CameraBackend>, constraints: CaptureConstraints) -> Self {
        Self {
            backend,
            constraints,
            stream: Mutex::new(None),
        }
    }

    pub fn constraints(&self) -> CaptureConstraints {
        self.constraints
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn CameraStream>>> {
        self.stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().is_some()
    }

    /// Native resolution of the active stream.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.lock().as_ref().map(|s| s.resolution())
    }

    /// Acquire the camera. Starting an already-streaming adapter is a no-op.
    pub async fn start(&self) -> Result<(), CaptureError> {
        if self.is_streaming() {
            debug!("capture already streaming");
            return Ok(());
        }
        info!(
            width = self.constraints.width,
            height = self.constraints.height,
            facing = ?self.constraints.facing_mode,
            "requesting camera access"
        );
        let stream = match self.backend.open(&self.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "camera access failed");
                return Err(e);
            }
        };
        let (w, h) = stream.resolution();

        let mut slot = self.lock();
        if slot.is_some() {
            // Lost a race with a concurrent start; keep the first stream.
            let mut extra = stream;
            extra.stop();
            return Ok(());
        }
        *slot = Some(stream);
        info!(width = w, height = h, "camera streaming");
        Ok(())
    }

    /// Release the camera. Safe to call at any time.
    pub fn stop(&self) {
        if let Some(mut stream) = self.lock().take() {
            stream.stop();
            info!("camera stopped");
        }
    }

    /// Sample the current frame as a JPEG. `None` when not streaming or when
    /// no frame could be produced.
    pub fn capture_frame(&self) -> Option<CapturedFrame> {
        let image = {
            let mut slot = self.lock();
            let stream = match slot.as_mut() {
                Some(stream) => stream,
                None => {
                    debug!("cannot capture frame: not streaming");
                    return None;
                }
            };
            stream.grab()?
        };

        let (width, height) = image.dimensions();
        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        if let Err(e) = image.write_with_encoder(encoder) {
            error!(error = %e, "failed to encode frame");
            return None;
        }
        Some(CapturedFrame {
            jpeg: Bytes::from(buf.into_inner()),
            width,
            height,
            captured_at: Utc::now(),
        })
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
