//! A camera that renders an animated test pattern instead of reading
//! hardware. Used by the CLI demo and by tests; can be told to fail with a
//! specific capture error.

use image::{Rgb, RgbImage};
use tracing::debug;

use super::{CameraBackend, CameraStream, CaptureConstraints, CaptureError};

/// Largest resolution the synthetic device offers; larger requests are
/// clamped the way `ideal` constraints are.
const MAX_RESOLUTION: (u32, u32) = (1920, 1080);

#[derive(Debug, Clone, Default)]
pub struct SyntheticCamera {
    failure: Option<CaptureError>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// A camera whose `open` always fails with `error`.
    pub fn failing(error: CaptureError) -> Self {
        Self {
            failure: Some(error),
        }
    }
}

#[async_trait::async_trait]
impl CameraBackend for SyntheticCamera {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CameraStream>, CaptureError> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        if constraints.width == 0 || constraints.height == 0 {
            return Err(CaptureError::ConstraintsUnsatisfiable);
        }
        let width = constraints.width.min(MAX_RESOLUTION.0);
        let height = constraints.height.min(MAX_RESOLUTION.1);
        debug!(width, height, "synthetic camera opened");
        Ok(Box::new(SyntheticStream {
            width,
            height,
            tick: 0,
            live: true,
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    tick: u32,
    live: bool,
}

impl CameraStream for SyntheticStream {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) -> Option<RgbImage> {
        if !self.live {
            return None;
        }
        self.tick = self.tick.wrapping_add(1);
        let (w, h, t) = (self.width, self.height, self.tick);

        // A face-sized blob drifting horizontally over a moving gradient.
        let cx = (w / 2 + t.wrapping_mul(7) % (w / 4 + 1)) as i64;
        let cy = (h / 2) as i64;
        let r = (h.min(w) / 5).max(1) as i64;

        Some(RgbImage::from_fn(w, h, |x, y| {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            if dx * dx + dy * dy <= r * r {
                Rgb([224, 172, 138])
            } else {
                let g = (x.wrapping_add(t.wrapping_mul(3)) % 256) as u8;
                let b = (y.wrapping_add(t) % 256) as u8;
                Rgb([32, g / 2, b])
            }
        }))
    }

    fn stop(&mut self) {
        self.live = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FacingMode;

    #[tokio::test]
    async fn test_oversized_request_is_clamped() {
        let camera = SyntheticCamera::new();
        let stream = camera
            .open(&CaptureConstraints {
                width: 4096,
                height: 4096,
                facing_mode: FacingMode::Environment,
            })
            .await
            .unwrap();
        assert_eq!(stream.resolution(), MAX_RESOLUTION);
    }

    #[tokio::test]
    async fn test_frames_change_and_stop() {
        let camera = SyntheticCamera::new();
        let mut stream = camera
            .open(&CaptureConstraints {
                width: 64,
                height: 48,
                facing_mode: FacingMode::User,
            })
            .await
            .unwrap();
        let a = stream.grab().unwrap();
        let b = stream.grab().unwrap();
        assert_eq!(a.dimensions(), (64, 48));
        assert_ne!(a, b);

        stream.stop();
        assert!(stream.grab().is_none());
    }
}
