//! Periodic webcam analysis.
//!
//! While analyzing, a timer fires every `interval`. Each tick samples a frame
//! and submits it, unless a previous submission is still in flight: at most
//! one request is outstanding at any time. Results that arrive after
//! analysis was stopped (or stopped and restarted) are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisError, AnalysisProvider, WebcamAnalysisResult};
use crate::capture::{CaptureError, CapturedFrame, MediaCapture};
use crate::config::WebcamConfig;
use crate::notify::Notice;
use crate::overlay::{draw_detection_overlay, Canvas};

/// Canvas size used when the stream reports no resolution.
const FALLBACK_RESOLUTION: (u32, u32) = (640, 480);

/// Shortest timer period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    Idle,
    Streaming,
    Analyzing,
}

/// What a single timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was captured and submitted.
    Submitted,
    /// The previous submission has not completed yet.
    Busy,
    /// The stream produced no frame.
    NoFrame,
    /// Analysis is not running.
    NotAnalyzing,
}

/// Point-in-time view of the loop, for display.
#[derive(Debug, Clone)]
pub struct LoopSnapshot {
    pub phase: LoopPhase,
    pub session_id: Option<String>,
    pub result: Option<WebcamAnalysisResult>,
    /// Most recent first.
    pub recent_frames: Vec<CapturedFrame>,
    pub frames_analyzed: u64,
    pub processing_time_ms: f64,
}

#[derive(Default)]
struct LoopState {
    analyzing: bool,
    session_id: Option<String>,
    result: Option<WebcamAnalysisResult>,
    recent_frames: VecDeque<CapturedFrame>,
    frames_analyzed: u64,
    processing_time_ms: f64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    capture: Arc<MediaCapture>,
    provider: Arc<dyn AnalysisProvider>,
    interval: Duration,
    history: usize,
    state: Mutex<LoopState>,
    in_flight: AtomicBool,
    /// Bumped whenever analysis stops; submissions tagged with an older
    /// epoch are stale.
    epoch: AtomicU64,
    notices: broadcast::Sender<Notice>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Clone)]
pub struct WebcamAnalysisLoop {
    inner: Arc<Inner>,
}

impl WebcamAnalysisLoop {
    pub fn new(
        capture: Arc<MediaCapture>,
        provider: Arc<dyn AnalysisProvider>,
        config: &WebcamConfig,
    ) -> Self {
        let (notices, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                capture,
                provider,
                interval: config.interval().max(MIN_INTERVAL),
                history: config.history.max(1),
                state: Mutex::new(LoopState::default()),
                in_flight: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                notices,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn capture(&self) -> &Arc<MediaCapture> {
        &self.inner.capture
    }

    fn state(&self) -> MutexGuard<'_, LoopState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            warn!(title = %notice.title, "{}", notice.description);
        } else {
            info!(title = %notice.title, "{}", notice.description);
        }
        let _ = self.inner.notices.send(notice);
    }

    pub fn phase(&self) -> LoopPhase {
        if !self.inner.capture.is_streaming() {
            LoopPhase::Idle
        } else if self.state().analyzing {
            LoopPhase::Analyzing
        } else {
            LoopPhase::Streaming
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Acquire the camera. Failures are announced as a "Webcam Error".
    pub async fn start_stream(&self) -> Result<(), CaptureError> {
        self.halt_if_stream_lost();
        if let Err(e) = self.inner.capture.start().await {
            self.notify(e.notice());
            return Err(e);
        }
        Ok(())
    }

    /// Stop analysis (silently) and release the camera.
    pub fn stop_stream(&self) {
        self.halt();
        self.inner.capture.stop();
    }

    /// Begin periodic analysis. Only possible while streaming; returns
    /// whether analysis is running afterwards.
    pub fn start_analysis(&self) -> bool {
        if !self.inner.capture.is_streaming() {
            debug!("cannot start analysis: camera not streaming");
            return false;
        }
        {
            let mut state = self.state();
            if state.analyzing {
                return true;
            }
            state.analyzing = true;
            state.timer = Some(spawn_timer(Arc::downgrade(&self.inner), self.inner.interval));
        }
        self.notify(Notice::info(
            "Analysis Started",
            "Real-time deepfake detection is now active",
        ));
        true
    }

    /// Stop periodic analysis, announcing how many frames were analyzed.
    pub fn stop_analysis(&self) {
        if self.halt() {
            let frames = self.state().frames_analyzed;
            self.notify(Notice::info(
                "Analysis Stopped",
                format!("Analyzed {} frames", frames),
            ));
        }
    }

    /// Flip between streaming and analyzing.
    pub fn toggle_analysis(&self) -> LoopPhase {
        self.halt_if_stream_lost();
        if self.state().analyzing {
            self.stop_analysis();
        } else {
            self.start_analysis();
        }
        self.phase()
    }

    /// Cancel the timer and invalidate outstanding submissions. Returns
    /// whether analysis was running.
    fn halt(&self) -> bool {
        let mut state = self.state();
        if !state.analyzing {
            return false;
        }
        state.analyzing = false;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// End analysis when the camera stopped underneath the loop. Returns
    /// whether the stream is gone.
    fn halt_if_stream_lost(&self) -> bool {
        if self.inner.capture.is_streaming() {
            return false;
        }
        if self.halt() {
            info!("camera stream ended, analysis stopped");
        }
        true
    }

    /// One timer tick. Must be called within a tokio runtime; the
    /// submission runs on a spawned task.
    pub fn tick(&self) -> TickOutcome {
        if self.halt_if_stream_lost() {
            return TickOutcome::NotAnalyzing;
        }
        let session_id = {
            let state = self.state();
            if !state.analyzing {
                return TickOutcome::NotAnalyzing;
            }
            state.session_id.clone()
        };
        if self.is_in_flight() {
            debug!("previous frame still processing, skipping tick");
            return TickOutcome::Busy;
        }
        let Some(frame) = self.inner.capture.capture_frame() else {
            return TickOutcome::NoFrame;
        };
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return TickOutcome::Busy;
        }

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this
                .inner
                .provider
                .analyze_frame(&frame.to_data_url(), session_id.as_deref())
                .await;
            this.complete(epoch, frame, outcome);
        });
        TickOutcome::Submitted
    }

    fn complete(
        &self,
        epoch: u64,
        frame: CapturedFrame,
        outcome: Result<WebcamAnalysisResult, AnalysisError>,
    ) {
        let stale = self.inner.epoch.load(Ordering::Acquire) != epoch;
        match outcome {
            Ok(result) if stale => {
                debug!(session = %result.session_id, "discarding result from stopped analysis");
            }
            Ok(result) => {
                debug!(
                    session = %result.session_id,
                    frames = result.frames_analyzed,
                    is_deepfake = result.is_deepfake,
                    "frame analyzed"
                );
                let mut state = self.state();
                state.session_id = Some(result.session_id.clone());
                state.frames_analyzed = result.frames_analyzed;
                state.processing_time_ms = result.processing_time * 1000.0;
                state.recent_frames.push_front(frame);
                state.recent_frames.truncate(self.inner.history);
                state.result = Some(result);
            }
            Err(e) if stale => {
                debug!(error = %e, "ignoring failure from stopped analysis");
            }
            Err(e) => {
                warn!(error = %e, "webcam frame analysis failed");
                self.notify(Notice::destructive(
                    "Analysis Error",
                    "Failed to analyze webcam frame. Please try again.",
                ));
            }
        }
        self.inner.in_flight.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> LoopSnapshot {
        let phase = self.phase();
        let state = self.state();
        LoopSnapshot {
            phase,
            session_id: state.session_id.clone(),
            result: state.result.clone(),
            recent_frames: state.recent_frames.iter().cloned().collect(),
            frames_analyzed: state.frames_analyzed,
            processing_time_ms: state.processing_time_ms,
        }
    }

    /// Draw the current result's areas at the stream's resolution. Returns
    /// the size drawn at.
    pub fn render_overlay<C: Canvas + ?Sized>(&self, canvas: &mut C) -> (u32, u32) {
        let (width, height) = self.inner.capture.resolution().unwrap_or(FALLBACK_RESOLUTION);
        let state = self.state();
        let areas = state.result.as_ref().map(|r| r.areas.as_slice()).unwrap_or(&[]);
        draw_detection_overlay(canvas, areas, width as f64, height as f64);
        (width, height)
    }
}

fn spawn_timer(inner: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the first capture happens
        // one period after analysis starts.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let outcome = WebcamAnalysisLoop { inner }.tick();
            if outcome == TickOutcome::NotAnalyzing {
                break;
            }
        }
    })
}
