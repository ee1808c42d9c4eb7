//! Pipeline configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classifier::{FACE_ALPHA, MOTION_ALPHA};
use crate::error::SignalError;
use crate::types::FeatureKind;
use crate::window::DEFAULT_WINDOW_TICKS;

/// Timing and smoothing parameters for the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Continuous-mode tick period (one rendered frame)
    pub frame_interval_ms: u64,
    /// Windowed-mode countdown length
    pub window_ticks: u32,
    /// Windowed-mode tick period
    pub window_tick_ms: u64,
    /// How long the Complete phase is shown before resources are released
    pub cooldown_ms: u64,
    /// EMA factor for eye, brow, jaw and mouth features
    pub face_alpha: f64,
    /// EMA factor for nose displacement
    pub motion_alpha: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            window_ticks: DEFAULT_WINDOW_TICKS,
            window_tick_ms: 1000,
            cooldown_ms: 2000,
            face_alpha: FACE_ALPHA,
            motion_alpha: MOTION_ALPHA,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, SignalError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SignalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.frame_interval_ms == 0 {
            return Err(SignalError::InvalidConfig(
                "frame_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.window_tick_ms == 0 {
            return Err(SignalError::InvalidConfig(
                "window_tick_ms must be greater than 0".to_string(),
            ));
        }
        if self.window_ticks == 0 {
            return Err(SignalError::InvalidConfig(
                "window_ticks must be greater than 0".to_string(),
            ));
        }
        let alphas = [
            ("face_alpha", self.face_alpha),
            ("motion_alpha", self.motion_alpha),
        ];
        for (name, alpha) in alphas {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(SignalError::InvalidConfig(format!(
                    "{name} must be within (0, 1), got {alpha}"
                )));
            }
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn window_tick(&self) -> Duration {
        Duration::from_millis(self.window_tick_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Per-feature EMA factors in [`FeatureKind::index`] order
    pub fn alphas(&self) -> [f64; 5] {
        let mut alphas = [self.face_alpha; 5];
        alphas[FeatureKind::NoseDisplacement.index()] = self.motion_alpha;
        alphas
    }
}
