mod common;

use proptest::prelude::*;

use checkin_signals::classifier::{Classifier, Direction, FeatureDescriptor};
use checkin_signals::features::{FeatureExtractor, SessionMemory};
use checkin_signals::smoother::ema;
use checkin_signals::types::{FeatureKind, Point};
use checkin_signals::window::SamplingWindow;
use checkin_signals::FeatureSample;

fn feature_kind() -> impl Strategy<Value = FeatureKind> {
    prop::sample::select(FeatureKind::ALL.to_vec())
}

fn sample(value: f64) -> FeatureSample {
    FeatureSample {
        eye_openness: value,
        brow_distance_ratio: value,
        jaw_distance_ratio: value,
        mouth_corner_droop: value,
        nose_displacement: value,
    }
}

proptest! {
    #[test]
    fn pt_classifier_is_deterministic_and_in_range(kind in feature_kind(), value in -1.0_f64..1.0) {
        let first = Classifier::classify(kind, value);
        let second = Classifier::classify(kind, value);
        prop_assert_eq!(first, second);
        prop_assert!((1..=5).contains(&first.value()));
    }

    #[test]
    fn pt_classifier_is_monotonic(kind in feature_kind(), a in -1.0_f64..1.0, b in -1.0_f64..1.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low_score = Classifier::classify(kind, low).value();
        let high_score = Classifier::classify(kind, high).value();
        match FeatureDescriptor::for_kind(kind).direction {
            Direction::AscendingGood => prop_assert!(low_score <= high_score),
            Direction::DescendingGood => prop_assert!(low_score >= high_score),
        }
    }

    #[test]
    fn pt_ema_stays_between_previous_and_sample(
        previous in -1.0_f64..1.0,
        value in -1.0_f64..1.0,
        alpha in 0.01_f64..0.99,
    ) {
        let next = ema(Some(previous), value, alpha);
        let (low, high) = if previous <= value { (previous, value) } else { (value, previous) };
        prop_assert!(next >= low - 1e-12 && next <= high + 1e-12);
    }

    #[test]
    fn pt_window_mean_is_bounded_by_samples(values in prop::collection::vec(0.0_f64..1.0, 1..15)) {
        let mut window = SamplingWindow::new(15);
        for value in &values {
            window.record(&sample(*value));
            window.tick();
        }

        let mean = window.mean(FeatureKind::JawDistanceRatio).unwrap();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(mean >= min - 1e-12 && mean <= max + 1e-12);

        let (summary, updates) = window.close();
        prop_assert_eq!(summary.ticks as usize, values.len());
        prop_assert_eq!(updates.len(), 5);
    }

    #[test]
    fn pt_translation_keeps_features(
        dx in -0.2_f64..0.2,
        dy in -0.2_f64..0.2,
        ear in 0.15_f64..0.35,
    ) {
        let base = common::face(Point::new(0.5, 0.5), ear);
        let shifted = checkin_signals::types::LandmarkFrame::new(
            base.points().iter().map(|p| Point::new(p.x + dx, p.y + dy)).collect(),
        );

        let a = FeatureExtractor::extract(&base, &mut SessionMemory::new()).unwrap();
        let b = FeatureExtractor::extract(&shifted, &mut SessionMemory::new()).unwrap();
        prop_assert!((a.eye_openness - b.eye_openness).abs() < 1e-9);
        prop_assert!((a.brow_distance_ratio - b.brow_distance_ratio).abs() < 1e-9);
        prop_assert!((a.jaw_distance_ratio - b.jaw_distance_ratio).abs() < 1e-9);
        prop_assert!((a.eye_openness - ear).abs() < 1e-9);
    }

    #[test]
    fn pt_first_sample_has_no_displacement(x in 0.0_f64..1.0, y in 0.0_f64..1.0) {
        let mut memory = SessionMemory::new();
        let frame = common::face(Point::new(x, y), 0.25);
        let sample = FeatureExtractor::extract(&frame, &mut memory).unwrap();
        prop_assert_eq!(sample.nose_displacement, 0.0);
        prop_assert_eq!(memory.previous_nose(), Some(Point::new(x, y)));
    }
}
