//! Continuous-mode smoothing
//!
//! This module keeps one exponential moving average per feature. Every entry
//! is unset until the first valid sample of the session arrives, which seeds
//! it directly without blending.

use serde::{Deserialize, Serialize};

use crate::classifier::FeatureDescriptor;
use crate::types::{FeatureKind, FeatureSample};

/// One EMA step: `prev * (1 - alpha) + sample * alpha`, or `sample` when unset
pub fn ema(previous: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match previous {
        Some(prev) => prev * (1.0 - alpha) + sample * alpha,
        None => sample,
    }
}

/// Smoothed estimate for each feature, in [`FeatureKind::index`] order
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SmoothedState {
    values: [Option<f64>; 5],
}

impl SmoothedState {
    pub fn get(&self, kind: FeatureKind) -> Option<f64> {
        self.values[kind.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// Per-feature EMA smoother
#[derive(Debug, Clone)]
pub struct Smoother {
    state: SmoothedState,
    alphas: [f64; 5],
}

impl Default for Smoother {
    fn default() -> Self {
        let mut alphas = [0.0; 5];
        for kind in FeatureKind::ALL {
            alphas[kind.index()] = FeatureDescriptor::for_kind(kind).alpha;
        }
        Self::with_alphas(alphas)
    }
}

impl Smoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a smoother with explicit per-feature factors
    pub fn with_alphas(alphas: [f64; 5]) -> Self {
        Self {
            state: SmoothedState::default(),
            alphas,
        }
    }

    pub fn alpha(&self, kind: FeatureKind) -> f64 {
        self.alphas[kind.index()]
    }

    /// Fold one sample into every feature and return the new state
    pub fn update(&mut self, sample: &FeatureSample) -> SmoothedState {
        for (kind, value) in sample.iter() {
            let slot = &mut self.state.values[kind.index()];
            *slot = Some(ema(*slot, value, self.alphas[kind.index()]));
        }
        self.state
    }

    pub fn state(&self) -> SmoothedState {
        self.state
    }

    /// Forget every estimate; the next sample seeds fresh values
    pub fn reset(&mut self) {
        self.state = SmoothedState::default();
    }
}
