//! Replay collaborators backed by recorded frames
//!
//! A [`ReplaySource`] hands out a capture device and a model loader that
//! share one recording. The capture handle emits frames in recording order
//! (one per `grab`), and the model answers with the face recorded for that
//! frame. Both report their activity to a shared [`ReplayStats`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::capture::{CaptureDevice, CaptureHandle, LandmarkModel, ModelLoader, VideoFrame};
use crate::error::SignalError;
use crate::schema::frame_record::FrameRecord;
use crate::types::LandmarkFrame;

/// Resource counters shared by every collaborator of one source
#[derive(Debug, Default)]
pub struct ReplayStats {
    acquired: AtomicU64,
    released: AtomicU64,
    grabbed: AtomicU64,
    models_loaded: AtomicU64,
    models_closed: AtomicU64,
    detect_calls: AtomicU64,
    exhausted: AtomicBool,
}

impl ReplayStats {
    /// Capture handles handed out
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Capture handles stopped
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Frames handed to the pipeline
    pub fn grabbed(&self) -> u64 {
        self.grabbed.load(Ordering::SeqCst)
    }

    pub fn models_loaded(&self) -> u64 {
        self.models_loaded.load(Ordering::SeqCst)
    }

    pub fn models_closed(&self) -> u64 {
        self.models_closed.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> u64 {
        self.detect_calls.load(Ordering::SeqCst)
    }

    /// Whether any capture handle ran past the end of the recording
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Capture handles currently live
    pub fn live_captures(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }
}

/// A recording plus the counters of everything replaying it
#[derive(Debug, Clone)]
pub struct ReplaySource {
    frames: Arc<Vec<FrameRecord>>,
    stats: Arc<ReplayStats>,
}

impl ReplaySource {
    pub fn new(frames: Vec<FrameRecord>) -> Self {
        Self {
            frames: Arc::new(frames),
            stats: Arc::new(ReplayStats::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn stats(&self) -> Arc<ReplayStats> {
        Arc::clone(&self.stats)
    }

    pub fn device(&self) -> ReplayDevice {
        ReplayDevice {
            frames: Arc::clone(&self.frames),
            stats: Arc::clone(&self.stats),
            failure: None,
        }
    }

    pub fn loader(&self) -> ReplayLoader {
        ReplayLoader {
            frames: Arc::clone(&self.frames),
            stats: Arc::clone(&self.stats),
            failure: None,
            latency: Duration::ZERO,
            detect_latency: Duration::ZERO,
        }
    }
}

/// Capture device replaying a recording from its first frame
#[derive(Debug, Clone)]
pub struct ReplayDevice {
    frames: Arc<Vec<FrameRecord>>,
    stats: Arc<ReplayStats>,
    failure: Option<String>,
}

impl ReplayDevice {
    /// Make every acquisition fail with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[async_trait]
impl CaptureDevice for ReplayDevice {
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, SignalError> {
        if let Some(message) = &self.failure {
            return Err(SignalError::DeviceUnavailable(message.clone()));
        }
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ReplayCapture {
            frames: Arc::clone(&self.frames),
            stats: Arc::clone(&self.stats),
            cursor: 0,
            live: true,
        }))
    }
}

/// Capture handle over a recording
#[derive(Debug)]
pub struct ReplayCapture {
    frames: Arc<Vec<FrameRecord>>,
    stats: Arc<ReplayStats>,
    cursor: usize,
    live: bool,
}

impl CaptureHandle for ReplayCapture {
    fn grab(&mut self) -> Option<VideoFrame> {
        if !self.live {
            return None;
        }
        let Some(record) = self.frames.get(self.cursor) else {
            if !self.stats.exhausted.swap(true, Ordering::SeqCst) {
                debug!(frames = self.frames.len(), "replay recording exhausted");
            }
            return None;
        };
        let index = self.cursor;
        self.cursor += 1;
        self.stats.grabbed.fetch_add(1, Ordering::SeqCst);

        // The frame sequence points back into the recording for the model
        record.ready.then(|| VideoFrame::empty(index as u64))
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

/// Model loader whose models answer from the recording
#[derive(Debug, Clone)]
pub struct ReplayLoader {
    frames: Arc<Vec<FrameRecord>>,
    stats: Arc<ReplayStats>,
    failure: Option<String>,
    latency: Duration,
    detect_latency: Duration,
}

impl ReplayLoader {
    /// Make every load fail with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Delay each load, like fetching model weights
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay every detection of the loaded models, like slow inference
    pub fn with_detect_latency(mut self, latency: Duration) -> Self {
        self.detect_latency = latency;
        self
    }
}

#[async_trait]
impl ModelLoader for ReplayLoader {
    async fn load(&self) -> Result<Box<dyn LandmarkModel>, SignalError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(message) = &self.failure {
            return Err(SignalError::ModelLoadFailure(message.clone()));
        }
        self.stats.models_loaded.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ReplayModel {
            frames: Arc::clone(&self.frames),
            stats: Arc::clone(&self.stats),
            latency: self.detect_latency,
            closed: false,
        }))
    }
}

/// Landmark model answering with recorded faces
#[derive(Debug)]
pub struct ReplayModel {
    frames: Arc<Vec<FrameRecord>>,
    stats: Arc<ReplayStats>,
    latency: Duration,
    closed: bool,
}

#[async_trait]
impl LandmarkModel for ReplayModel {
    async fn detect(&mut self, frame: &VideoFrame, _timestamp_ms: f64) -> Option<LandmarkFrame> {
        if self.closed {
            return None;
        }
        self.stats.detect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.frames
            .get(usize::try_from(frame.sequence).ok()?)
            .and_then(|record| record.face.clone())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.models_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::neutral_face;
    use crate::types::Point;

    fn recording() -> Vec<FrameRecord> {
        vec![
            FrameRecord::with_face(0, 0.0, neutral_face(Point::new(0.5, 0.5))),
            FrameRecord::not_ready(1, 16.0),
            FrameRecord::without_face(2, 32.0),
        ]
    }

    #[tokio::test]
    async fn test_capture_replays_in_order_then_exhausts() {
        let source = ReplaySource::new(recording());
        let mut capture = source.device().acquire().await.unwrap();
        let mut model = source.loader().load().await.unwrap();

        let first = capture.grab().unwrap();
        assert!(model.detect(&first, 0.0).await.is_some());

        // Not-ready frame yields nothing
        assert!(capture.grab().is_none());

        let third = capture.grab().unwrap();
        assert!(model.detect(&third, 32.0).await.is_none());

        assert!(capture.grab().is_none());
        let stats = source.stats();
        assert!(stats.is_exhausted());
        assert_eq!(stats.grabbed(), 3);
        assert_eq!(stats.detect_calls(), 2);
    }

    #[tokio::test]
    async fn test_stop_counts_release_once() {
        let source = ReplaySource::new(recording());
        let device = source.device();
        let mut capture = device.acquire().await.unwrap();
        assert_eq!(source.stats().live_captures(), 1);

        device.release(capture.as_mut());
        device.release(capture.as_mut());

        assert!(!capture.is_live());
        assert!(capture.grab().is_none());
        assert_eq!(source.stats().released(), 1);
        assert_eq!(source.stats().live_captures(), 0);
    }

    #[tokio::test]
    async fn test_failures_map_to_error_kinds() {
        let source = ReplaySource::new(recording());

        let err = source.device().failing("denied").acquire().await.err().unwrap();
        assert!(matches!(err, SignalError::DeviceUnavailable(_)));

        let err = source.loader().failing("404").load().await.err().unwrap();
        assert!(matches!(err, SignalError::ModelLoadFailure(_)));

        assert_eq!(source.stats().acquired(), 0);
        assert_eq!(source.stats().models_loaded(), 0);
    }
}
