//! Shared check-in draft
//!
//! The draft is the only state shared between the pipeline and the rest of
//! the check-in form. Two writers touch it: the pipeline (classifier output)
//! and the user (dot controls). Every write takes the lock once, so a
//! pipeline tick lands as a whole and overwrites whatever the user set.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{Metric, ScoreUpdate, WellnessScore};

/// Five wellness scores of one check-in; 0 means the metric is unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinDraft {
    pub sleep: WellnessScore,
    pub stress: WellnessScore,
    pub tension: WellnessScore,
    pub mood: WellnessScore,
    pub focus: WellnessScore,
}

impl CheckinDraft {
    pub fn get(&self, metric: Metric) -> WellnessScore {
        match metric {
            Metric::Sleep => self.sleep,
            Metric::Stress => self.stress,
            Metric::Tension => self.tension,
            Metric::Mood => self.mood,
            Metric::Focus => self.focus,
        }
    }

    /// Set a score, returning whether it changed
    pub fn set(&mut self, metric: Metric, score: WellnessScore) -> bool {
        let slot = match metric {
            Metric::Sleep => &mut self.sleep,
            Metric::Stress => &mut self.stress,
            Metric::Tension => &mut self.tension,
            Metric::Mood => &mut self.mood,
            Metric::Focus => &mut self.focus,
        };
        let changed = *slot != score;
        *slot = score;
        changed
    }

    /// Dot-control click: select `level`, or clear it if already selected
    pub fn toggle(&mut self, metric: Metric, level: WellnessScore) -> WellnessScore {
        let next = if self.get(metric) == level {
            WellnessScore::UNSET
        } else {
            level
        };
        self.set(metric, next);
        next
    }

    /// Apply classifier output; returns how many metrics changed
    pub fn apply(&mut self, updates: &[ScoreUpdate]) -> usize {
        updates
            .iter()
            .filter(|update| self.set(update.metric, update.score))
            .count()
    }

    pub fn set_metrics(&self) -> impl Iterator<Item = (Metric, WellnessScore)> + '_ {
        Metric::ALL
            .iter()
            .map(move |&metric| (metric, self.get(metric)))
            .filter(|(_, score)| score.is_set())
    }

    /// One-line summary of the set metrics, e.g. `Sleep quality: 4/5, Mood: 3/5`.
    /// Unset metrics are left out.
    pub fn text_summary(&self) -> String {
        self.set_metrics()
            .map(|(metric, score)| format!("{}: {}/{}", metric.label(), score, WellnessScore::MAX))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Cloneable handle to the draft shared with the form
#[derive(Debug, Clone, Default)]
pub struct DraftHandle {
    inner: Arc<Mutex<CheckinDraft>>,
}

impl DraftHandle {
    pub fn new(draft: CheckinDraft) -> Self {
        Self {
            inner: Arc::new(Mutex::new(draft)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CheckinDraft> {
        // A panic while holding the lock cannot leave a score half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> CheckinDraft {
        *self.lock()
    }

    pub fn get(&self, metric: Metric) -> WellnessScore {
        self.lock().get(metric)
    }

    /// Pipeline write: all updates of one tick under one lock
    pub fn apply(&self, updates: &[ScoreUpdate]) -> usize {
        self.lock().apply(updates)
    }

    /// Manual write from the score control
    pub fn set(&self, metric: Metric, score: WellnessScore) {
        self.lock().set(metric, score);
    }

    pub fn toggle(&self, metric: Metric, level: WellnessScore) -> WellnessScore {
        self.lock().toggle(metric, level)
    }

    pub fn text_summary(&self) -> String {
        self.lock().text_summary()
    }
}
