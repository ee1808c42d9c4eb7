//! Pipeline orchestration
//!
//! [`ModeController`] is the state machine behind the auto-detect button. It
//! owns the camera and model lifecycle, runs one session at a time on a tokio
//! task and publishes its [`Phase`] through a watch channel:
//!
//! ```text
//! Idle -> AcquiringDevice -> Loading -> Active                          (continuous)
//! Idle -> AcquiringDevice -> Loading -> Active -> Analyzing -> Complete -> Idle   (windowed)
//! AcquiringDevice | Loading -> Error
//! ```
//!
//! [`FrameProcessor`] is the synchronous counterpart for callers that push
//! landmark frames themselves (FFI, CLI extraction).

use chrono::{DateTime, Utc};
use std::future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{CaptureDevice, ModelLoader};
use crate::classifier::Classifier;
use crate::config::PipelineConfig;
use crate::draft::DraftHandle;
use crate::error::SignalError;
use crate::features::{FeatureExtractor, SessionMemory};
use crate::session::{strategy_for, Detection, Sampler, Session, TickProgress};
use crate::smoother::{SmoothedState, Smoother};
use crate::types::{
    CameraStatus, FeatureKind, FeatureSample, LandmarkFrame, Mode, Phase, ScoreUpdate,
    SessionEnd, SessionReport, SessionStats, SkipReason,
};

/// Result of pressing the auto-detect button
#[derive(Debug, Clone, PartialEq)]
pub enum Toggled {
    Started(Uuid),
    Stopped(Option<SessionReport>),
}

struct RunningSession {
    id: Uuid,
    mode: Mode,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<SessionReport>,
}

/// Owns device/model lifecycle and mode selection
pub struct ModeController {
    device: Arc<dyn CaptureDevice>,
    loader: Arc<dyn ModelLoader>,
    draft: DraftHandle,
    config: PipelineConfig,
    phase: Arc<watch::Sender<Phase>>,
    running: Option<RunningSession>,
    last_report: Option<SessionReport>,
}

impl ModeController {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        loader: Arc<dyn ModelLoader>,
        draft: DraftHandle,
        config: PipelineConfig,
    ) -> Result<Self, SignalError> {
        config.validate()?;
        let (phase, _) = watch::channel(Phase::Idle);
        Ok(Self {
            device,
            loader,
            draft,
            config,
            phase: Arc::new(phase),
            running: None,
            last_report: None,
        })
    }

    /// Start a session in `mode` and return its id.
    ///
    /// Fails with [`SignalError::SessionActive`] while a session task is
    /// still running, including the cooldown after a windowed completion.
    pub async fn start(&mut self, mode: Mode) -> Result<Uuid, SignalError> {
        if self.is_running() {
            return Err(SignalError::SessionActive);
        }
        if let Some(finished) = self.running.take() {
            self.finish(finished).await;
        }

        let id = Uuid::new_v4();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = SessionTask {
            id,
            mode,
            device: Arc::clone(&self.device),
            loader: Arc::clone(&self.loader),
            draft: self.draft.clone(),
            config: self.config.clone(),
            phase: Arc::clone(&self.phase),
            shutdown: shutdown_rx,
        };

        info!(session_id = %id, mode = mode.as_str(), "starting session");
        self.running = Some(RunningSession {
            id,
            mode,
            shutdown,
            task: tokio::spawn(task.run()),
        });
        Ok(id)
    }

    /// Cancel the running session and wait until it has released everything.
    ///
    /// Stopping a windowed session before its countdown ends discards the
    /// buffered samples without writing scores. Calling this with no session
    /// is a no-op, and stopping from [`Phase::Error`] returns to Idle.
    pub async fn stop(&mut self) -> Option<SessionReport> {
        let report = match self.running.take() {
            Some(running) => {
                running.shutdown.send_replace(true);
                self.finish(running).await
            }
            None => None,
        };
        if matches!(*self.phase.borrow(), Phase::Error { .. }) {
            self.publish_idle();
        }
        report
    }

    /// Stop if a session is running, otherwise start one
    pub async fn toggle(&mut self, mode: Mode) -> Result<Toggled, SignalError> {
        if self.is_running() {
            Ok(Toggled::Stopped(self.stop().await))
        } else {
            self.start(mode).await.map(Toggled::Started)
        }
    }

    /// Wait for the running session to end on its own.
    ///
    /// A continuous session only ends when stopped, so this is meant for
    /// windowed sessions and failed starts.
    pub async fn join(&mut self) -> Option<SessionReport> {
        let running = self.running.take()?;
        self.finish(running).await
    }

    async fn finish(&mut self, running: RunningSession) -> Option<SessionReport> {
        match running.task.await {
            Ok(report) => {
                self.last_report = Some(report.clone());
                Some(report)
            }
            Err(e) => {
                warn!(session_id = %running.id, error = %e, "session task aborted");
                self.publish_idle();
                None
            }
        }
    }

    fn publish_idle(&self) {
        self.phase.send_replace(Phase::Idle);
    }

    /// Whether a session task is still running
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Id of the current (or just finished, not yet joined) session
    pub fn session_id(&self) -> Option<Uuid> {
        self.running.as_ref().map(|running| running.id)
    }

    pub fn mode(&self) -> Option<Mode> {
        self.running.as_ref().map(|running| running.mode)
    }

    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn camera_status(&self) -> CameraStatus {
        self.phase.borrow().camera_status()
    }

    /// True while a session is writing scores into the draft
    pub fn is_auto_filling(&self) -> bool {
        self.phase.borrow().is_sampling()
    }

    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    pub fn draft(&self) -> &DraftHandle {
        &self.draft
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.send_replace(true);
        }
    }
}

/// Everything a session task needs, moved onto the task
struct SessionTask {
    id: Uuid,
    mode: Mode,
    device: Arc<dyn CaptureDevice>,
    loader: Arc<dyn ModelLoader>,
    draft: DraftHandle,
    config: PipelineConfig,
    phase: Arc<watch::Sender<Phase>>,
    shutdown: watch::Receiver<bool>,
}

impl SessionTask {
    async fn run(mut self) -> SessionReport {
        let started_at = Utc::now();

        self.publish(Phase::AcquiringDevice);
        let acquired = tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => None,
            result = self.device.acquire() => Some(result),
        };
        let mut capture = match acquired {
            None => return self.abandon(started_at),
            Some(Ok(capture)) => capture,
            Some(Err(e)) => return self.fail(started_at, e),
        };

        self.publish(Phase::Loading);
        let loaded = tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => None,
            result = self.loader.load() => Some(result),
        };
        let model = match loaded {
            Some(Ok(model)) => model,
            other => {
                // Roll back the stream before reporting
                self.device.release(capture.as_mut());
                return match other {
                    Some(Err(e)) => self.fail(started_at, e),
                    _ => self.abandon(started_at),
                };
            }
        };

        let mut session = Session::new(
            self.id,
            Arc::clone(&self.device),
            capture,
            model,
            strategy_for(self.mode, &self.config),
        );

        self.publish(Phase::Active);
        let sampling = session.sampling_phase();
        if sampling != Phase::Active {
            self.publish(sampling);
        }

        // Detections are rescheduled after each one finishes; the countdown
        // counts every elapsed period whether or not a detection is running
        let start = Instant::now();
        let period = session.detect_interval();
        let mut detect_ticker = time::interval_at(start + period, period);
        detect_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut countdown = session.countdown_interval().map(|period| {
            let mut ticker = time::interval_at(start + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            ticker
        });
        let mut in_flight: Option<Detection> = None;

        let end = loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break SessionEnd::Stopped,
                (sampler, result) = detection_finished(&mut in_flight) => {
                    in_flight = None;
                    session.finish_detection(sampler, result, &self.draft);
                }
                _ = detect_ticker.tick(), if in_flight.is_none() => {
                    in_flight = session.begin_detection();
                }
                _ = countdown_elapsed(&mut countdown) => match session.count_down() {
                    TickProgress::Continue => {}
                    TickProgress::Countdown { remaining_ticks } => {
                        self.publish(Phase::Analyzing { remaining_ticks });
                    }
                    TickProgress::Expired => break SessionEnd::Completed,
                },
            }
        };

        if in_flight.take().is_some() {
            debug!(session_id = %self.id, "detection abandoned at session end");
        }

        let window = if end == SessionEnd::Completed {
            let summary = session.finalize(&self.draft);
            self.publish(Phase::Complete);
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => {}
                _ = time::sleep(self.config.cooldown()) => {}
            }
            summary
        } else {
            None
        };

        session.release();
        let report = session.report(end, window);
        self.publish(Phase::Idle);
        info!(
            session_id = %self.id,
            end = ?report.end,
            ticks = report.stats.ticks,
            samples = report.stats.samples,
            detection_gaps = report.stats.detection_gaps,
            "session ended"
        );
        report
    }

    fn publish(&self, phase: Phase) {
        match &phase {
            Phase::Analyzing { remaining_ticks } => {
                debug!(session_id = %self.id, remaining_ticks, "countdown");
            }
            _ => info!(session_id = %self.id, phase = ?phase, "phase changed"),
        }
        self.phase.send_replace(phase);
    }

    /// Stopped before the session was running
    fn abandon(&self, started_at: DateTime<Utc>) -> SessionReport {
        self.publish(Phase::Idle);
        self.empty_report(started_at, SessionEnd::Stopped)
    }

    fn fail(&self, started_at: DateTime<Utc>, error: SignalError) -> SessionReport {
        warn!(session_id = %self.id, error = %error, "session failed to start");
        self.publish(Phase::Error {
            message: error.status_message(),
        });
        self.empty_report(
            started_at,
            SessionEnd::Failed {
                reason: error.to_string(),
            },
        )
    }

    fn empty_report(&self, started_at: DateTime<Utc>, end: SessionEnd) -> SessionReport {
        SessionReport {
            session_id: self.id,
            mode: self.mode,
            started_at,
            ended_at: Utc::now(),
            end,
            stats: SessionStats::default(),
            window: None,
        }
    }
}

/// Resolves once shutdown is requested or the controller is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Resolves when the running detection finishes; never without one
async fn detection_finished(
    in_flight: &mut Option<Detection>,
) -> (Sampler, Result<FeatureSample, SkipReason>) {
    match in_flight {
        Some(detection) => detection.await,
        None => future::pending().await,
    }
}

/// Resolves on every countdown period; never for sessions without one
async fn countdown_elapsed(countdown: &mut Option<time::Interval>) {
    match countdown {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

/// Stateful processor for callers that push landmark frames themselves.
///
/// Runs extraction, EMA smoothing and classification the way a continuous
/// session does, without a camera or a clock.
#[derive(Debug, Clone, Default)]
pub struct FrameProcessor {
    memory: SessionMemory,
    smoother: Smoother,
    frames: u64,
    accepted: u64,
}

impl FrameProcessor {
    /// Create a new processor with the default smoothing factors
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a processor with the smoothing factors of `config`
    pub fn with_config(config: &PipelineConfig) -> Result<Self, SignalError> {
        config.validate()?;
        Ok(Self {
            smoother: Smoother::with_alphas(config.alphas()),
            ..Self::default()
        })
    }

    /// Process one frame; `None` when the frame yields no valid sample
    pub fn process(&mut self, frame: &LandmarkFrame) -> Option<Vec<ScoreUpdate>> {
        self.frames += 1;
        let sample = FeatureExtractor::extract(frame, &mut self.memory)?;
        self.accepted += 1;
        let state = self.smoother.update(&sample);
        Some(
            FeatureKind::ALL
                .iter()
                .filter_map(|&kind| state.get(kind).map(|v| Classifier::score_update(kind, v)))
                .collect(),
        )
    }

    /// Process a JSON landmark array; returns the updates as JSON, or `None`
    pub fn process_json(&mut self, frame_json: &str) -> Result<Option<String>, SignalError> {
        let frame: LandmarkFrame = serde_json::from_str(frame_json)?;
        match self.process(&frame) {
            Some(updates) => Ok(Some(serde_json::to_string(&updates)?)),
            None => Ok(None),
        }
    }

    pub fn smoothed(&self) -> SmoothedState {
        self.smoother.state()
    }

    /// Frames seen since the last reset
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames that produced a sample since the last reset
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Forget all session memory
    pub fn reset(&mut self) {
        self.memory.reset();
        self.smoother.reset();
        self.frames = 0;
        self.accepted = 0;
    }
}
