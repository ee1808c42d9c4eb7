//! Score classification
//!
//! This module maps a scalar feature value onto a 1-5 wellness score using a
//! fixed per-feature table of ascending boundaries. Each feature shares the
//! same evaluation rule and differs only in its descriptor.

use serde::Serialize;

use crate::types::{FeatureKind, FeatureSample, ScoreUpdate, WellnessScore};

/// Whether a larger feature value reads as a better score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    AscendingGood,
    DescendingGood,
}

/// Per-feature parameters: boundary table, score order, and EMA factor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureDescriptor {
    pub kind: FeatureKind,
    /// Ascending bracket boundaries
    pub boundaries: [f64; 4],
    /// Score for each bracket; the last entry applies above every boundary
    pub scores: [u8; 5],
    pub direction: Direction,
    /// Default EMA factor for continuous smoothing
    pub alpha: f64,
}

/// Default EMA factor for the slow facial features
pub const FACE_ALPHA: f64 = 0.10;

/// Default EMA factor for head motion, faster to follow movement
pub const MOTION_ALPHA: f64 = 0.18;

const DESCENDING_SCORES: [u8; 5] = [5, 4, 3, 2, 1];

/// Descriptor table, in [`FeatureKind::index`] order
pub const DESCRIPTORS: [FeatureDescriptor; 5] = [
    FeatureDescriptor {
        kind: FeatureKind::EyeOpenness,
        boundaries: [0.20, 0.22, 0.24, 0.27],
        scores: [1, 2, 3, 4, 5],
        direction: Direction::AscendingGood,
        alpha: FACE_ALPHA,
    },
    FeatureDescriptor {
        kind: FeatureKind::BrowDistanceRatio,
        boundaries: [0.20, 0.215, 0.23, 0.245],
        scores: DESCENDING_SCORES,
        direction: Direction::DescendingGood,
        alpha: FACE_ALPHA,
    },
    FeatureDescriptor {
        kind: FeatureKind::JawDistanceRatio,
        boundaries: [0.28, 0.30, 0.32, 0.34],
        scores: DESCENDING_SCORES,
        direction: Direction::DescendingGood,
        alpha: FACE_ALPHA,
    },
    FeatureDescriptor {
        kind: FeatureKind::MouthCornerDroop,
        boundaries: [-0.012, -0.004, 0.004, 0.012],
        scores: DESCENDING_SCORES,
        direction: Direction::DescendingGood,
        alpha: FACE_ALPHA,
    },
    FeatureDescriptor {
        kind: FeatureKind::NoseDisplacement,
        boundaries: [0.0018, 0.0032, 0.0048, 0.0068],
        scores: DESCENDING_SCORES,
        direction: Direction::DescendingGood,
        alpha: MOTION_ALPHA,
    },
];

impl FeatureDescriptor {
    pub fn for_kind(kind: FeatureKind) -> &'static FeatureDescriptor {
        &DESCRIPTORS[kind.index()]
    }

    /// First boundary the value is strictly below picks the score;
    /// a value equal to a boundary falls into the next bracket.
    pub fn classify(&self, value: f64) -> WellnessScore {
        let position = self
            .boundaries
            .iter()
            .position(|&boundary| value < boundary)
            .unwrap_or(self.boundaries.len());
        WellnessScore::level(self.scores[position])
    }
}

/// Classifier for feature values
pub struct Classifier;

impl Classifier {
    /// Classify one feature value.
    ///
    /// Callers only pass finite values; a NaN fails every comparison and
    /// lands in the last bracket.
    pub fn classify(kind: FeatureKind, value: f64) -> WellnessScore {
        FeatureDescriptor::for_kind(kind).classify(value)
    }

    /// Classify one feature into the draft update for its metric
    pub fn score_update(kind: FeatureKind, value: f64) -> ScoreUpdate {
        ScoreUpdate {
            metric: kind.metric(),
            score: Self::classify(kind, value),
        }
    }

    /// Classify all five features of a sample
    pub fn classify_sample(sample: &FeatureSample) -> Vec<ScoreUpdate> {
        sample
            .iter()
            .map(|(kind, value)| Self::score_update(kind, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metric;

    #[test]
    fn test_descriptor_table_order() {
        for kind in FeatureKind::ALL {
            assert_eq!(FeatureDescriptor::for_kind(kind).kind, kind);
        }
    }

    #[test]
    fn test_boundaries_ascend_and_scores_follow_direction() {
        for descriptor in DESCRIPTORS.iter() {
            assert!(descriptor.boundaries.windows(2).all(|w| w[0] < w[1]));
            let rising = descriptor.scores.windows(2).all(|w| w[0] < w[1]);
            match descriptor.direction {
                Direction::AscendingGood => assert!(rising),
                Direction::DescendingGood => assert!(!rising),
            }
        }
    }

    #[test]
    fn test_eye_openness_brackets() {
        let score = |v| Classifier::classify(FeatureKind::EyeOpenness, v).value();
        assert_eq!(score(0.15), 1);
        assert_eq!(score(0.21), 2);
        assert_eq!(score(0.22), 3);
        assert_eq!(score(0.25), 4);
        assert_eq!(score(0.30), 5);
    }

    #[test]
    fn test_boundary_value_falls_into_next_bracket() {
        assert_eq!(Classifier::classify(FeatureKind::EyeOpenness, 0.20).value(), 2);
        assert_eq!(Classifier::classify(FeatureKind::EyeOpenness, 0.27).value(), 5);
        assert_eq!(Classifier::classify(FeatureKind::BrowDistanceRatio, 0.20).value(), 4);
        assert_eq!(Classifier::classify(FeatureKind::NoseDisplacement, 0.0068).value(), 1);
    }

    #[test]
    fn test_descending_features() {
        assert_eq!(Classifier::classify(FeatureKind::BrowDistanceRatio, 0.19).value(), 5);
        assert_eq!(Classifier::classify(FeatureKind::BrowDistanceRatio, 0.25).value(), 1);
        assert_eq!(Classifier::classify(FeatureKind::JawDistanceRatio, 0.31).value(), 3);
        assert_eq!(Classifier::classify(FeatureKind::MouthCornerDroop, -0.02).value(), 5);
        assert_eq!(Classifier::classify(FeatureKind::MouthCornerDroop, 0.0).value(), 3);
        assert_eq!(Classifier::classify(FeatureKind::MouthCornerDroop, 0.02).value(), 1);
        assert_eq!(Classifier::classify(FeatureKind::NoseDisplacement, 0.0).value(), 5);
        assert_eq!(Classifier::classify(FeatureKind::NoseDisplacement, 0.004).value(), 3);
    }

    #[test]
    fn test_classify_sample_targets_each_metric() {
        let sample = FeatureSample {
            eye_openness: 0.25,
            brow_distance_ratio: 0.22,
            jaw_distance_ratio: 0.29,
            mouth_corner_droop: -0.005,
            nose_displacement: 0.001,
        };
        let updates = Classifier::classify_sample(&sample);
        let values: Vec<(Metric, u8)> =
            updates.iter().map(|u| (u.metric, u.score.value())).collect();

        assert_eq!(
            values,
            vec![
                (Metric::Sleep, 4),
                (Metric::Stress, 3),
                (Metric::Tension, 4),
                (Metric::Mood, 4),
                (Metric::Focus, 5),
            ]
        );
    }
}
