//! Feature extraction
//!
//! This module turns one landmark frame into the five geometric features:
//! - Eye openness (mean six-point eye aspect ratio)
//! - Brow and jaw spans normalized by face width
//! - Mouth-corner droop relative to the lip center
//! - Nose-tip displacement since the previous frame of the session

use serde::{Deserialize, Serialize};

use crate::types::{FeatureSample, Landmark, LandmarkFrame, Point};

/// Spans shorter than this are treated as degenerate geometry
const MIN_SPAN: f64 = 1e-6;

/// Session-scoped memory mutated by extraction.
///
/// Owned by exactly one session and reset at every session start, so
/// displacement never spans two sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMemory {
    previous_nose: Option<Point>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_nose(&self) -> Option<Point> {
        self.previous_nose
    }

    pub fn reset(&mut self) {
        self.previous_nose = None;
    }
}

/// Feature extractor for landmark frames
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Extract features from a frame.
    ///
    /// Returns `None` when the frame is missing a named point or has
    /// non-finite or degenerate geometry; the memory is left untouched then.
    pub fn extract(frame: &LandmarkFrame, memory: &mut SessionMemory) -> Option<FeatureSample> {
        let face = FacePoints::from_frame(frame)?;

        let face_width = face.edge_left.distance(&face.edge_right);
        if face_width < MIN_SPAN {
            return None;
        }

        let eye_openness = compute_eye_openness(&face)?;
        let brow_distance_ratio = face.brow_left.distance(&face.brow_right) / face_width;
        let jaw_distance_ratio = face.mouth_left.distance(&face.mouth_right) / face_width;
        let mouth_corner_droop = compute_mouth_corner_droop(&face);
        let nose_displacement = compute_nose_displacement(face.nose, memory);

        Some(FeatureSample {
            eye_openness,
            brow_distance_ratio,
            jaw_distance_ratio,
            mouth_corner_droop,
            nose_displacement,
        })
    }

    /// Extract without session history (displacement is always 0)
    pub fn extract_stateless(frame: &LandmarkFrame) -> Option<FeatureSample> {
        Self::extract(frame, &mut SessionMemory::new())
    }
}

/// The named points of one frame, all finite
struct FacePoints {
    nose: Point,
    upper_lip: Point,
    lower_lip: Point,
    mouth_left: Point,
    mouth_right: Point,
    brow_left: Point,
    brow_right: Point,
    edge_left: Point,
    edge_right: Point,
    left_eye: EyePoints,
    right_eye: EyePoints,
}

struct EyePoints {
    corner_a: Point,
    corner_b: Point,
    upper_a: Point,
    lower_a: Point,
    upper_b: Point,
    lower_b: Point,
}

impl FacePoints {
    fn from_frame(frame: &LandmarkFrame) -> Option<Self> {
        let get = |landmark: Landmark| frame.point(landmark).filter(Point::is_finite);

        Some(Self {
            nose: get(Landmark::NoseTip)?,
            upper_lip: get(Landmark::UpperLipCenter)?,
            lower_lip: get(Landmark::LowerLipCenter)?,
            mouth_left: get(Landmark::MouthCornerLeft)?,
            mouth_right: get(Landmark::MouthCornerRight)?,
            brow_left: get(Landmark::BrowLeft)?,
            brow_right: get(Landmark::BrowRight)?,
            edge_left: get(Landmark::FaceEdgeLeft)?,
            edge_right: get(Landmark::FaceEdgeRight)?,
            left_eye: EyePoints {
                corner_a: get(Landmark::LeftEyeOuterCorner)?,
                corner_b: get(Landmark::LeftEyeInnerCorner)?,
                upper_a: get(Landmark::LeftEyeUpperA)?,
                lower_a: get(Landmark::LeftEyeLowerA)?,
                upper_b: get(Landmark::LeftEyeUpperB)?,
                lower_b: get(Landmark::LeftEyeLowerB)?,
            },
            right_eye: EyePoints {
                corner_a: get(Landmark::RightEyeInnerCorner)?,
                corner_b: get(Landmark::RightEyeOuterCorner)?,
                upper_a: get(Landmark::RightEyeUpperA)?,
                lower_a: get(Landmark::RightEyeLowerA)?,
                upper_b: get(Landmark::RightEyeUpperB)?,
                lower_b: get(Landmark::RightEyeLowerB)?,
            },
        })
    }
}

/// Six-point eye aspect ratio: `(|p2-p6| + |p3-p5|) / (2 * |p1-p4|)`
fn eye_aspect_ratio(eye: &EyePoints) -> Option<f64> {
    let horizontal = eye.corner_a.distance(&eye.corner_b);
    if horizontal < MIN_SPAN {
        return None;
    }
    let vertical_a = eye.upper_a.distance(&eye.lower_a);
    let vertical_b = eye.upper_b.distance(&eye.lower_b);
    Some((vertical_a + vertical_b) / (2.0 * horizontal))
}

/// Mean of the left and right eye aspect ratios
fn compute_eye_openness(face: &FacePoints) -> Option<f64> {
    let left = eye_aspect_ratio(&face.left_eye)?;
    let right = eye_aspect_ratio(&face.right_eye)?;
    Some((left + right) / 2.0)
}

/// Average corner y minus lip-center y.
/// Negative when the corners sit above the center (smile-like).
fn compute_mouth_corner_droop(face: &FacePoints) -> f64 {
    let center_y = (face.upper_lip.y + face.lower_lip.y) / 2.0;
    let corners_y = (face.mouth_left.y + face.mouth_right.y) / 2.0;
    corners_y - center_y
}

/// L1 distance to the previous nose position; 0 on the first frame.
/// Always overwrites the stored position.
fn compute_nose_displacement(nose: Point, memory: &mut SessionMemory) -> f64 {
    let previous = memory.previous_nose.replace(nose);
    match previous {
        Some(prev) => nose.manhattan(&prev),
        None => 0.0,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A neutral synthetic face with an eye aspect ratio of 0.25 per eye,
    /// brow ratio 0.2, jaw ratio 0.3 and a flat mouth.
    pub(crate) fn neutral_face(nose: Point) -> LandmarkFrame {
        LandmarkFrame::from_named(&[
            (Landmark::NoseTip, nose),
            (Landmark::UpperLipCenter, Point::new(0.5, 0.69)),
            (Landmark::LowerLipCenter, Point::new(0.5, 0.71)),
            (Landmark::MouthCornerLeft, Point::new(0.35, 0.70)),
            (Landmark::MouthCornerRight, Point::new(0.65, 0.70)),
            (Landmark::BrowLeft, Point::new(0.40, 0.30)),
            (Landmark::BrowRight, Point::new(0.60, 0.30)),
            (Landmark::FaceEdgeLeft, Point::new(0.0, 0.5)),
            (Landmark::FaceEdgeRight, Point::new(1.0, 0.5)),
            // Left eye: width 0.1, lid gaps 0.025
            (Landmark::LeftEyeOuterCorner, Point::new(0.25, 0.40)),
            (Landmark::LeftEyeInnerCorner, Point::new(0.35, 0.40)),
            (Landmark::LeftEyeUpperA, Point::new(0.28, 0.3875)),
            (Landmark::LeftEyeLowerA, Point::new(0.28, 0.4125)),
            (Landmark::LeftEyeUpperB, Point::new(0.32, 0.3875)),
            (Landmark::LeftEyeLowerB, Point::new(0.32, 0.4125)),
            // Right eye mirrors the left
            (Landmark::RightEyeInnerCorner, Point::new(0.65, 0.40)),
            (Landmark::RightEyeOuterCorner, Point::new(0.75, 0.40)),
            (Landmark::RightEyeUpperA, Point::new(0.68, 0.3875)),
            (Landmark::RightEyeLowerA, Point::new(0.68, 0.4125)),
            (Landmark::RightEyeUpperB, Point::new(0.72, 0.3875)),
            (Landmark::RightEyeLowerB, Point::new(0.72, 0.4125)),
        ])
    }

    #[test]
    fn test_neutral_face_features() {
        let mut memory = SessionMemory::new();
        let sample = FeatureExtractor::extract(&neutral_face(Point::new(0.5, 0.5)), &mut memory)
            .expect("neutral face should be valid");

        assert!((sample.eye_openness - 0.25).abs() < 1e-9);
        assert!((sample.brow_distance_ratio - 0.2).abs() < 1e-9);
        assert!((sample.jaw_distance_ratio - 0.3).abs() < 1e-9);
        assert!(sample.mouth_corner_droop.abs() < 1e-9);
        assert_eq!(sample.nose_displacement, 0.0);
    }

    #[test]
    fn test_squint_lowers_eye_openness() {
        let frame = neutral_face(Point::new(0.5, 0.5))
            .with_point(Landmark::LeftEyeUpperA, Point::new(0.28, 0.395))
            .with_point(Landmark::LeftEyeLowerA, Point::new(0.28, 0.405))
            .with_point(Landmark::LeftEyeUpperB, Point::new(0.32, 0.395))
            .with_point(Landmark::LeftEyeLowerB, Point::new(0.32, 0.405));

        let sample = FeatureExtractor::extract_stateless(&frame).unwrap();
        // Left EAR 0.1, right EAR 0.25
        assert!((sample.eye_openness - 0.175).abs() < 1e-9);
    }

    #[test]
    fn test_mouth_corner_droop_sign() {
        let smile = neutral_face(Point::new(0.5, 0.5))
            .with_point(Landmark::MouthCornerLeft, Point::new(0.35, 0.68))
            .with_point(Landmark::MouthCornerRight, Point::new(0.65, 0.68));
        let frown = neutral_face(Point::new(0.5, 0.5))
            .with_point(Landmark::MouthCornerLeft, Point::new(0.35, 0.72))
            .with_point(Landmark::MouthCornerRight, Point::new(0.65, 0.72));

        let smile = FeatureExtractor::extract_stateless(&smile).unwrap();
        let frown = FeatureExtractor::extract_stateless(&frown).unwrap();

        assert!((smile.mouth_corner_droop + 0.02).abs() < 1e-9);
        assert!((frown.mouth_corner_droop - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_nose_displacement_example() {
        let mut memory = SessionMemory::new();

        let first = FeatureExtractor::extract(&neutral_face(Point::new(0.500, 0.500)), &mut memory)
            .unwrap();
        assert_eq!(first.nose_displacement, 0.0);

        let second =
            FeatureExtractor::extract(&neutral_face(Point::new(0.502, 0.498)), &mut memory)
                .unwrap();
        assert!((second.nose_displacement - 0.004).abs() < 1e-12);
        assert_eq!(memory.previous_nose(), Some(Point::new(0.502, 0.498)));
    }

    #[test]
    fn test_reset_clears_nose_memory() {
        let mut memory = SessionMemory::new();
        FeatureExtractor::extract(&neutral_face(Point::new(0.1, 0.1)), &mut memory).unwrap();
        memory.reset();

        let sample =
            FeatureExtractor::extract(&neutral_face(Point::new(0.9, 0.9)), &mut memory).unwrap();
        assert_eq!(sample.nose_displacement, 0.0);
    }

    #[test]
    fn test_incomplete_frame_is_rejected_without_touching_memory() {
        let mut memory = SessionMemory::new();
        FeatureExtractor::extract(&neutral_face(Point::new(0.5, 0.5)), &mut memory).unwrap();

        let partial = LandmarkFrame::new(vec![Point::new(0.6, 0.6); 200]);
        assert!(FeatureExtractor::extract(&partial, &mut memory).is_none());
        assert_eq!(memory.previous_nose(), Some(Point::new(0.5, 0.5)));
    }

    #[test]
    fn test_degenerate_geometry_is_rejected() {
        let collapsed = neutral_face(Point::new(0.5, 0.5))
            .with_point(Landmark::FaceEdgeRight, Point::new(0.0, 0.5));
        assert!(FeatureExtractor::extract_stateless(&collapsed).is_none());

        let closed_corners = neutral_face(Point::new(0.5, 0.5))
            .with_point(Landmark::LeftEyeInnerCorner, Point::new(0.25, 0.40));
        assert!(FeatureExtractor::extract_stateless(&closed_corners).is_none());

        let nan = neutral_face(Point::new(f64::NAN, 0.5));
        assert!(FeatureExtractor::extract_stateless(&nan).is_none());
    }
}
