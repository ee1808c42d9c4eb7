//! Acquisition sessions
//!
//! A [`Session`] is one run of the pipeline between start and stop. Its
//! [`Sampler`] owns the capture handle, the loaded model and the per-session
//! feature memory exclusively. A detection borrows nothing: the sampler is
//! moved into the [`Detection`] future and handed back when it finishes, so
//! at most one inference is ever in flight and dropping an unfinished
//! detection releases the camera with it.
//!
//! What happens to each sample is up to the [`AcquisitionStrategy`]:
//! continuous mode smooths and writes every sample, windowed mode buffers
//! samples and writes once when its countdown ends. The countdown runs on
//! its own clock, independent of detection latency.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::capture::{CaptureDevice, CaptureHandle, LandmarkModel};
use crate::classifier::Classifier;
use crate::config::PipelineConfig;
use crate::draft::DraftHandle;
use crate::features::{FeatureExtractor, SessionMemory};
use crate::smoother::Smoother;
use crate::types::{
    FeatureKind, FeatureSample, Mode, Phase, ScoreUpdate, SessionEnd, SessionReport,
    SessionStats, SkipReason, WindowSummary,
};
use crate::window::SamplingWindow;

/// What a strategy reports after a countdown period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickProgress {
    /// Keep going; nothing to publish
    Continue,
    /// Windowed countdown moved on
    Countdown { remaining_ticks: u32 },
    /// The window is over and should be finalized
    Expired,
}

/// Per-mode handling of feature samples
pub trait AcquisitionStrategy: Send {
    fn mode(&self) -> Mode;

    /// Period between two detections
    fn detect_interval(&self) -> Duration;

    /// Countdown period, `None` when the session runs until stopped
    fn countdown_interval(&self) -> Option<Duration>;

    /// Phase published once the session starts sampling
    fn sampling_phase(&self) -> Phase;

    /// Fold one detection into the strategy. `sample` is `None` for skips.
    fn record(&mut self, sample: Option<&FeatureSample>, draft: &DraftHandle);

    /// Count one elapsed countdown period
    fn count_down(&mut self) -> TickProgress;

    /// Close sampling after natural completion
    fn finalize(&mut self, draft: &DraftHandle) -> Option<WindowSummary>;
}

/// Smooth every valid sample and write all five scores
#[derive(Debug, Clone)]
pub struct ContinuousStrategy {
    smoother: Smoother,
    interval: Duration,
}

impl ContinuousStrategy {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            smoother: Smoother::with_alphas(config.alphas()),
            interval: config.frame_interval(),
        }
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }
}

impl AcquisitionStrategy for ContinuousStrategy {
    fn mode(&self) -> Mode {
        Mode::Continuous
    }

    fn detect_interval(&self) -> Duration {
        self.interval
    }

    fn countdown_interval(&self) -> Option<Duration> {
        None
    }

    fn sampling_phase(&self) -> Phase {
        Phase::Active
    }

    fn record(&mut self, sample: Option<&FeatureSample>, draft: &DraftHandle) {
        let Some(sample) = sample else {
            return;
        };
        let state = self.smoother.update(sample);
        let updates: Vec<ScoreUpdate> = FeatureKind::ALL
            .iter()
            .filter_map(|&kind| state.get(kind).map(|value| Classifier::score_update(kind, value)))
            .collect();
        draft.apply(&updates);
    }

    fn count_down(&mut self) -> TickProgress {
        TickProgress::Continue
    }

    fn finalize(&mut self, _draft: &DraftHandle) -> Option<WindowSummary> {
        self.smoother.reset();
        None
    }
}

/// Buffer raw samples for a fixed countdown, then write the means once
#[derive(Debug, Clone)]
pub struct WindowedStrategy {
    window: SamplingWindow,
    interval: Duration,
}

impl WindowedStrategy {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            window: SamplingWindow::new(config.window_ticks),
            interval: config.window_tick(),
        }
    }

    pub fn window(&self) -> &SamplingWindow {
        &self.window
    }
}

impl AcquisitionStrategy for WindowedStrategy {
    fn mode(&self) -> Mode {
        Mode::Windowed
    }

    fn detect_interval(&self) -> Duration {
        self.interval
    }

    fn countdown_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn sampling_phase(&self) -> Phase {
        Phase::Analyzing {
            remaining_ticks: self.window.remaining_ticks(),
        }
    }

    fn record(&mut self, sample: Option<&FeatureSample>, _draft: &DraftHandle) {
        if let Some(sample) = sample {
            self.window.record(sample);
        }
    }

    fn count_down(&mut self) -> TickProgress {
        match self.window.tick() {
            0 => TickProgress::Expired,
            remaining_ticks => TickProgress::Countdown { remaining_ticks },
        }
    }

    fn finalize(&mut self, draft: &DraftHandle) -> Option<WindowSummary> {
        let (summary, updates) = self.window.close();
        draft.apply(&updates);
        Some(summary)
    }
}

/// Build the strategy for a mode
pub fn strategy_for(mode: Mode, config: &PipelineConfig) -> Box<dyn AcquisitionStrategy> {
    match mode {
        Mode::Continuous => Box::new(ContinuousStrategy::new(config)),
        Mode::Windowed => Box::new(WindowedStrategy::new(config)),
    }
}

/// A running grab-detect-extract pass. Resolves to the sampler it took.
pub type Detection =
    Pin<Box<dyn Future<Output = (Sampler, Result<FeatureSample, SkipReason>)> + Send>>;

/// Camera stream, landmark model and feature memory of one session
pub struct Sampler {
    device: Arc<dyn CaptureDevice>,
    capture: Option<Box<dyn CaptureHandle>>,
    model: Option<Box<dyn LandmarkModel>>,
    memory: SessionMemory,
    origin: Instant,
}

impl Sampler {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        capture: Box<dyn CaptureHandle>,
        model: Box<dyn LandmarkModel>,
    ) -> Self {
        Self {
            device,
            capture: Some(capture),
            model: Some(model),
            memory: SessionMemory::new(),
            origin: Instant::now(),
        }
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    /// Move the sampler into one grab-detect-extract pass
    pub fn detect(self) -> Detection {
        let mut sampler = self;
        Box::pin(async move {
            let result = sampler.next_sample().await;
            (sampler, result)
        })
    }

    async fn next_sample(&mut self) -> Result<FeatureSample, SkipReason> {
        let (Some(capture), Some(model)) = (self.capture.as_mut(), self.model.as_mut()) else {
            return Err(SkipReason::InvalidFrame);
        };
        let frame = capture.grab().ok_or(SkipReason::InvalidFrame)?;
        let timestamp_ms = self.origin.elapsed().as_secs_f64() * 1000.0;
        let face = model
            .detect(&frame, timestamp_ms)
            .await
            .ok_or(SkipReason::DetectionGap)?;
        FeatureExtractor::extract(&face, &mut self.memory).ok_or(SkipReason::InvalidFrame)
    }

    /// Stop the stream, close the model and forget the feature memory.
    /// Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            self.device.release(capture.as_mut());
        }
        if let Some(mut model) = self.model.take() {
            model.close();
        }
        self.memory.reset();
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.release();
    }
}

/// One running acquisition
pub struct Session {
    id: Uuid,
    sampler: Option<Sampler>,
    released: bool,
    strategy: Box<dyn AcquisitionStrategy>,
    started_at: DateTime<Utc>,
    stats: SessionStats,
}

impl Session {
    /// Take ownership of an acquired stream and a loaded model
    pub fn new(
        id: Uuid,
        device: Arc<dyn CaptureDevice>,
        capture: Box<dyn CaptureHandle>,
        model: Box<dyn LandmarkModel>,
        strategy: Box<dyn AcquisitionStrategy>,
    ) -> Self {
        Self {
            id,
            sampler: Some(Sampler::new(device, capture, model)),
            released: false,
            strategy,
            started_at: Utc::now(),
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.strategy.mode()
    }

    pub fn detect_interval(&self) -> Duration {
        self.strategy.detect_interval()
    }

    pub fn countdown_interval(&self) -> Option<Duration> {
        self.strategy.countdown_interval()
    }

    pub fn sampling_phase(&self) -> Phase {
        self.strategy.sampling_phase()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Feature memory, `None` while a detection holds the sampler
    pub fn memory(&self) -> Option<&SessionMemory> {
        self.sampler.as_ref().map(Sampler::memory)
    }

    /// Start a detection. `None` while another one is in flight or after
    /// the session was released.
    pub fn begin_detection(&mut self) -> Option<Detection> {
        if self.released {
            return None;
        }
        self.sampler.take().map(Sampler::detect)
    }

    /// Take the sampler back and hand the result to the strategy
    pub fn finish_detection(
        &mut self,
        sampler: Sampler,
        result: Result<FeatureSample, SkipReason>,
        draft: &DraftHandle,
    ) -> Option<SkipReason> {
        self.stats.ticks += 1;
        if self.released {
            drop(sampler);
            return None;
        }
        self.sampler = Some(sampler);

        match result {
            Ok(sample) => {
                self.stats.samples += 1;
                self.strategy.record(Some(&sample), draft);
                None
            }
            Err(reason) => {
                self.stats.record_skip(reason);
                debug!(
                    session_id = %self.id,
                    tick = self.stats.ticks,
                    ?reason,
                    "detection skipped"
                );
                self.strategy.record(None, draft);
                Some(reason)
            }
        }
    }

    /// Count one elapsed countdown period
    pub fn count_down(&mut self) -> TickProgress {
        self.strategy.count_down()
    }

    /// Close sampling after the strategy reported expiry
    pub fn finalize(&mut self, draft: &DraftHandle) -> Option<WindowSummary> {
        self.strategy.finalize(draft)
    }

    /// Stop the stream, close the model and forget the session memory.
    /// Safe to call more than once. A sampler lent to a detection is
    /// released when that detection is dropped.
    pub fn release(&mut self) {
        self.released = true;
        if let Some(mut sampler) = self.sampler.take() {
            sampler.release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn report(&self, end: SessionEnd, window: Option<WindowSummary>) -> SessionReport {
        SessionReport {
            session_id: self.id,
            mode: self.mode(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            end,
            stats: self.stats.clone(),
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ModelLoader;
    use crate::draft::CheckinDraft;
    use crate::features::tests::neutral_face;
    use crate::schema::{FrameRecord, ReplaySource};
    use crate::types::{Metric, Point};
    use pretty_assertions::assert_eq;

    async fn open(source: &ReplaySource, mode: Mode, config: &PipelineConfig) -> Session {
        let device = Arc::new(source.device());
        let capture = device.acquire().await.unwrap();
        let model = source.loader().load().await.unwrap();
        Session::new(Uuid::new_v4(), device, capture, model, strategy_for(mode, config))
    }

    async fn detect_once(session: &mut Session, draft: &DraftHandle) -> Option<SkipReason> {
        let detection = session.begin_detection().unwrap();
        let (sampler, result) = detection.await;
        session.finish_detection(sampler, result, draft)
    }

    fn faces(count: u64) -> Vec<FrameRecord> {
        (0..count)
            .map(|i| {
                FrameRecord::with_face(i, i as f64 * 16.0, neutral_face(Point::new(0.5, 0.5)))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_continuous_detection_writes_all_scores() {
        let source = ReplaySource::new(faces(1));
        let draft = DraftHandle::default();
        let mut session = open(&source, Mode::Continuous, &PipelineConfig::default()).await;
        assert_eq!(session.countdown_interval(), None);

        assert_eq!(detect_once(&mut session, &draft).await, None);
        assert_eq!(session.count_down(), TickProgress::Continue);

        let snapshot = draft.snapshot();
        for metric in Metric::ALL {
            assert!(snapshot.get(metric).is_set(), "{metric:?} should be set");
        }
        // EAR 0.25 sits in the [0.24, 0.27) band
        assert_eq!(snapshot.sleep.value(), 4);
        assert_eq!(session.stats().samples, 1);
    }

    #[tokio::test]
    async fn test_skips_are_classified() {
        let source = ReplaySource::new(vec![
            FrameRecord::not_ready(0, 0.0),
            FrameRecord::without_face(1, 16.0),
        ]);
        let draft = DraftHandle::default();
        let mut session = open(&source, Mode::Continuous, &PipelineConfig::default()).await;

        assert_eq!(detect_once(&mut session, &draft).await, Some(SkipReason::InvalidFrame));
        assert_eq!(detect_once(&mut session, &draft).await, Some(SkipReason::DetectionGap));
        // Recording exhausted
        assert_eq!(detect_once(&mut session, &draft).await, Some(SkipReason::InvalidFrame));

        let stats = session.stats();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.detection_gaps, 1);
        assert_eq!(stats.invalid_frames, 2);
        assert_eq!(draft.snapshot(), CheckinDraft::default());
    }

    #[tokio::test]
    async fn test_windowed_counts_down_and_writes_once() {
        let config = PipelineConfig {
            window_ticks: 3,
            ..PipelineConfig::default()
        };
        let source = ReplaySource::new(faces(3));
        let draft = DraftHandle::default();
        let mut session = open(&source, Mode::Windowed, &config).await;
        assert_eq!(session.sampling_phase(), Phase::Analyzing { remaining_ticks: 3 });
        assert_eq!(session.countdown_interval(), Some(Duration::from_secs(1)));

        detect_once(&mut session, &draft).await;
        assert_eq!(session.count_down(), TickProgress::Countdown { remaining_ticks: 2 });
        detect_once(&mut session, &draft).await;
        assert_eq!(session.count_down(), TickProgress::Countdown { remaining_ticks: 1 });
        assert!(!draft.snapshot().sleep.is_set());

        detect_once(&mut session, &draft).await;
        assert_eq!(session.count_down(), TickProgress::Expired);

        let summary = session.finalize(&draft).unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.aggregate(FeatureKind::EyeOpenness).unwrap().samples, 3);
        assert_eq!(draft.snapshot().sleep.value(), 4);
    }

    #[tokio::test]
    async fn test_countdown_does_not_wait_for_detections() {
        let config = PipelineConfig {
            window_ticks: 2,
            ..PipelineConfig::default()
        };
        let source = ReplaySource::new(faces(2));
        let draft = DraftHandle::default();
        let mut session = open(&source, Mode::Windowed, &config).await;

        let pending = session.begin_detection().unwrap();
        assert!(session.begin_detection().is_none());
        assert_eq!(session.count_down(), TickProgress::Countdown { remaining_ticks: 1 });
        assert_eq!(session.count_down(), TickProgress::Expired);

        // The unfinished detection takes the stream down with it
        drop(pending);
        assert_eq!(source.stats().live_captures(), 0);
        assert_eq!(source.stats().models_closed(), 1);

        let summary = session.finalize(&draft).unwrap();
        assert_eq!(summary.aggregate(FeatureKind::EyeOpenness).unwrap().samples, 0);
        assert_eq!(draft.snapshot(), CheckinDraft::default());
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_clears_memory() {
        let source = ReplaySource::new(faces(1));
        let draft = DraftHandle::default();
        let mut session = open(&source, Mode::Continuous, &PipelineConfig::default()).await;
        detect_once(&mut session, &draft).await;
        assert!(session.memory().unwrap().previous_nose().is_some());

        session.release();
        session.release();
        assert!(session.is_released());
        assert!(session.memory().is_none());
        assert!(session.begin_detection().is_none());
        drop(session);

        let stats = source.stats();
        assert_eq!(stats.released(), 1);
        assert_eq!(stats.models_closed(), 1);
        assert_eq!(stats.live_captures(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_resources() {
        let source = ReplaySource::new(faces(1));
        let session = open(&source, Mode::Windowed, &PipelineConfig::default()).await;
        assert_eq!(source.stats().live_captures(), 1);

        drop(session);
        assert_eq!(source.stats().live_captures(), 0);
    }
}
