//! Windowed-mode sampling
//!
//! A sampling window collects raw, unsmoothed feature samples over a fixed
//! number of ticks and closes with one unweighted mean per feature. Ticks
//! that produced no sample still count down.

use crate::classifier::Classifier;
use crate::types::{FeatureAggregate, FeatureKind, FeatureSample, ScoreUpdate, WindowSummary};

/// Default window length in ticks (one tick per second)
pub const DEFAULT_WINDOW_TICKS: u32 = 15;

/// Fixed-duration raw sample collector
#[derive(Debug, Clone)]
pub struct SamplingWindow {
    buffers: [Vec<f64>; 5],
    total_ticks: u32,
    remaining_ticks: u32,
}

impl Default for SamplingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_TICKS)
    }
}

impl SamplingWindow {
    /// Create an open window with empty buffers
    pub fn new(total_ticks: u32) -> Self {
        Self {
            buffers: Default::default(),
            total_ticks,
            remaining_ticks: total_ticks,
        }
    }

    /// Append a sample; ignored once the window has expired
    pub fn record(&mut self, sample: &FeatureSample) {
        if self.is_expired() {
            return;
        }
        for (kind, value) in sample.iter() {
            self.buffers[kind.index()].push(value);
        }
    }

    /// Count one elapsed tick and return the ticks left
    pub fn tick(&mut self) -> u32 {
        self.remaining_ticks = self.remaining_ticks.saturating_sub(1);
        self.remaining_ticks
    }

    pub fn remaining_ticks(&self) -> u32 {
        self.remaining_ticks
    }

    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_ticks == 0
    }

    /// Samples collected so far for one feature, in arrival order
    pub fn samples(&self, kind: FeatureKind) -> &[f64] {
        &self.buffers[kind.index()]
    }

    /// Unweighted mean, `None` for an empty sequence
    pub fn mean(&self, kind: FeatureKind) -> Option<f64> {
        mean(&self.buffers[kind.index()])
    }

    /// Aggregate and classify every non-empty sequence, then clear the buffers.
    ///
    /// Features without samples produce no update so their existing scores
    /// stay as they were.
    pub fn close(&mut self) -> (WindowSummary, Vec<ScoreUpdate>) {
        let mut aggregates = Vec::with_capacity(FeatureKind::ALL.len());
        let mut updates = Vec::new();

        for kind in FeatureKind::ALL {
            let samples = self.buffers[kind.index()].len();
            let mean = self.mean(kind);
            let score = mean.map(|value| {
                let update = Classifier::score_update(kind, value);
                updates.push(update);
                update.score
            });
            aggregates.push(FeatureAggregate {
                feature: kind,
                samples,
                mean,
                score,
            });
        }

        let summary = WindowSummary {
            ticks: self.total_ticks - self.remaining_ticks,
            aggregates,
        };
        self.clear();

        (summary, updates)
    }

    /// Drop every buffered sample and restart the countdown
    pub fn clear(&mut self) {
        for buffer in self.buffers.iter_mut() {
            buffer.clear();
        }
        self.remaining_ticks = self.total_ticks;
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(sum / values.len() as f64)
}
