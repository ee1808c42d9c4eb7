//! Core types for the check-in signal pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: landmark frames, per-frame feature samples, wellness scores, and
//! the session phase/report types published by the controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::SignalError;

/// Number of points in a full face-mesh frame
pub const MESH_POINT_COUNT: usize = 478;

/// A 2D point in normalized [0,1] image coordinates (y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// L1 (city-block) distance
    pub fn manhattan(&self, other: &Point) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Named face-mesh landmarks consumed by the feature extractor.
///
/// Eye points follow the six-point eye-aspect-ratio layout: two corners
/// (horizontal span) and two upper/lower eyelid pairs (`A` and `B`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Landmark {
    NoseTip,
    UpperLipCenter,
    LowerLipCenter,
    MouthCornerLeft,
    MouthCornerRight,
    BrowLeft,
    BrowRight,
    FaceEdgeLeft,
    FaceEdgeRight,
    LeftEyeOuterCorner,
    LeftEyeUpperA,
    LeftEyeUpperB,
    LeftEyeInnerCorner,
    LeftEyeLowerB,
    LeftEyeLowerA,
    RightEyeInnerCorner,
    RightEyeUpperA,
    RightEyeUpperB,
    RightEyeOuterCorner,
    RightEyeLowerB,
    RightEyeLowerA,
}

impl Landmark {
    pub const ALL: [Landmark; 21] = [
        Landmark::NoseTip,
        Landmark::UpperLipCenter,
        Landmark::LowerLipCenter,
        Landmark::MouthCornerLeft,
        Landmark::MouthCornerRight,
        Landmark::BrowLeft,
        Landmark::BrowRight,
        Landmark::FaceEdgeLeft,
        Landmark::FaceEdgeRight,
        Landmark::LeftEyeOuterCorner,
        Landmark::LeftEyeUpperA,
        Landmark::LeftEyeUpperB,
        Landmark::LeftEyeInnerCorner,
        Landmark::LeftEyeLowerB,
        Landmark::LeftEyeLowerA,
        Landmark::RightEyeInnerCorner,
        Landmark::RightEyeUpperA,
        Landmark::RightEyeUpperB,
        Landmark::RightEyeOuterCorner,
        Landmark::RightEyeLowerB,
        Landmark::RightEyeLowerA,
    ];

    /// Index of this landmark in the face-mesh point list
    pub const fn index(self) -> usize {
        match self {
            Landmark::NoseTip => 1,
            Landmark::UpperLipCenter => 13,
            Landmark::LowerLipCenter => 14,
            Landmark::MouthCornerLeft => 61,
            Landmark::MouthCornerRight => 291,
            Landmark::BrowLeft => 70,
            Landmark::BrowRight => 300,
            Landmark::FaceEdgeLeft => 234,
            Landmark::FaceEdgeRight => 454,
            Landmark::LeftEyeOuterCorner => 33,
            Landmark::LeftEyeUpperA => 160,
            Landmark::LeftEyeUpperB => 158,
            Landmark::LeftEyeInnerCorner => 133,
            Landmark::LeftEyeLowerB => 153,
            Landmark::LeftEyeLowerA => 144,
            Landmark::RightEyeInnerCorner => 362,
            Landmark::RightEyeUpperA => 385,
            Landmark::RightEyeUpperB => 387,
            Landmark::RightEyeOuterCorner => 263,
            Landmark::RightEyeLowerB => 373,
            Landmark::RightEyeLowerA => 380,
        }
    }

    /// Smallest point count a frame needs to carry every named landmark
    pub fn required_point_count() -> usize {
        Landmark::ALL.iter().map(|l| l.index()).max().unwrap_or(0) + 1
    }
}

/// One detected face in one video frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFrame {
    points: Vec<Point>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Build a full-size mesh with only the given named points placed.
    ///
    /// Unnamed points sit at the image center. Useful for synthetic faces.
    pub fn from_named(named: &[(Landmark, Point)]) -> Self {
        let mut points = vec![Point::new(0.5, 0.5); MESH_POINT_COUNT];
        for (landmark, point) in named {
            points[landmark.index()] = *point;
        }
        Self { points }
    }

    pub fn point(&self, landmark: Landmark) -> Option<Point> {
        self.points.get(landmark.index()).copied()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether every named landmark is present
    pub fn has_required_points(&self) -> bool {
        self.points.len() >= Landmark::required_point_count()
    }

    /// Move a named point, returning the updated frame
    pub fn with_point(mut self, landmark: Landmark, point: Point) -> Self {
        if let Some(slot) = self.points.get_mut(landmark.index()) {
            *slot = point;
        }
        self
    }
}

/// The five scalar geometric features derived from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    EyeOpenness,
    BrowDistanceRatio,
    JawDistanceRatio,
    MouthCornerDroop,
    NoseDisplacement,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::EyeOpenness,
        FeatureKind::BrowDistanceRatio,
        FeatureKind::JawDistanceRatio,
        FeatureKind::MouthCornerDroop,
        FeatureKind::NoseDisplacement,
    ];

    /// Position in per-feature arrays
    pub const fn index(self) -> usize {
        match self {
            FeatureKind::EyeOpenness => 0,
            FeatureKind::BrowDistanceRatio => 1,
            FeatureKind::JawDistanceRatio => 2,
            FeatureKind::MouthCornerDroop => 3,
            FeatureKind::NoseDisplacement => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::EyeOpenness => "eye_openness",
            FeatureKind::BrowDistanceRatio => "brow_distance_ratio",
            FeatureKind::JawDistanceRatio => "jaw_distance_ratio",
            FeatureKind::MouthCornerDroop => "mouth_corner_droop",
            FeatureKind::NoseDisplacement => "nose_displacement",
        }
    }

    /// Check-in metric this feature is classified into
    pub const fn metric(self) -> Metric {
        match self {
            FeatureKind::EyeOpenness => Metric::Sleep,
            FeatureKind::BrowDistanceRatio => Metric::Stress,
            FeatureKind::JawDistanceRatio => Metric::Tension,
            FeatureKind::MouthCornerDroop => Metric::Mood,
            FeatureKind::NoseDisplacement => Metric::Focus,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKind {
    type Err = SignalError;

    /// Accepts snake_case, kebab-case, and camelCase names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "eyeopenness" => Ok(FeatureKind::EyeOpenness),
            "browdistanceratio" => Ok(FeatureKind::BrowDistanceRatio),
            "jawdistanceratio" => Ok(FeatureKind::JawDistanceRatio),
            "mouthcornerdroop" => Ok(FeatureKind::MouthCornerDroop),
            "nosedisplacement" => Ok(FeatureKind::NoseDisplacement),
            _ => Err(SignalError::UnknownFeature(s.to_string())),
        }
    }
}

/// One frame's geometric features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSample {
    /// Mean eye aspect ratio (lower = more closed)
    pub eye_openness: f64,
    /// Inter-brow distance / face width (lower = brows drawn together)
    pub brow_distance_ratio: f64,
    /// Mouth-corner span / face width (lower = more jaw tension)
    pub jaw_distance_ratio: f64,
    /// Mouth-corner y minus mouth-center y (negative = smile-like)
    pub mouth_corner_droop: f64,
    /// L1 nose-tip movement since the previous frame of the session
    pub nose_displacement: f64,
}

impl FeatureSample {
    pub fn get(&self, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::EyeOpenness => self.eye_openness,
            FeatureKind::BrowDistanceRatio => self.brow_distance_ratio,
            FeatureKind::JawDistanceRatio => self.jaw_distance_ratio,
            FeatureKind::MouthCornerDroop => self.mouth_corner_droop,
            FeatureKind::NoseDisplacement => self.nose_displacement,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureKind, f64)> + '_ {
        FeatureKind::ALL.iter().map(move |&kind| (kind, self.get(kind)))
    }

    pub fn is_finite(&self) -> bool {
        self.iter().all(|(_, v)| v.is_finite())
    }
}

/// Check-in metrics filled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Sleep,
    Stress,
    Tension,
    Mood,
    Focus,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Sleep,
        Metric::Stress,
        Metric::Tension,
        Metric::Mood,
        Metric::Focus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Sleep => "sleep",
            Metric::Stress => "stress",
            Metric::Tension => "tension",
            Metric::Mood => "mood",
            Metric::Focus => "focus",
        }
    }

    /// Label used on the check-in form and in text summaries
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Sleep => "Sleep quality",
            Metric::Stress => "Stress level",
            Metric::Tension => "Tension",
            Metric::Mood => "Mood",
            Metric::Focus => "Focus",
        }
    }
}

/// A discrete 0-5 check-in score; 0 means unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct WellnessScore(u8);

impl WellnessScore {
    pub const UNSET: WellnessScore = WellnessScore(0);
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, SignalError> {
        if value > Self::MAX {
            return Err(SignalError::InvalidScore(value));
        }
        Ok(Self(value))
    }

    /// Classifier levels come from fixed tables and are always 1-5
    pub(crate) const fn level(value: u8) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl TryFrom<u8> for WellnessScore {
    type Error = SignalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WellnessScore> for u8 {
    fn from(score: WellnessScore) -> Self {
        score.0
    }
}

impl fmt::Display for WellnessScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One classifier output destined for the check-in draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub metric: Metric,
    pub score: WellnessScore,
}

/// Acquisition mode, selected once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Live EMA smoothing until stopped
    Continuous,
    /// Fixed countdown window, aggregated once at expiry
    Windowed,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Continuous => "continuous",
            Mode::Windowed => "windowed",
        }
    }
}

/// Controller lifecycle phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AcquiringDevice,
    Loading,
    Active,
    Analyzing { remaining_ticks: u32 },
    Complete,
    Error { message: String },
}

impl Phase {
    pub fn camera_status(&self) -> CameraStatus {
        match self {
            Phase::Idle => CameraStatus::Off,
            Phase::AcquiringDevice | Phase::Loading => CameraStatus::Loading,
            Phase::Active | Phase::Analyzing { .. } | Phase::Complete => CameraStatus::On,
            Phase::Error { .. } => CameraStatus::Error,
        }
    }

    /// Whether the pipeline is currently writing scores
    pub fn is_sampling(&self) -> bool {
        matches!(self, Phase::Active | Phase::Analyzing { .. })
    }
}

/// Coarse camera indicator shown next to the auto-detect toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Off,
    Loading,
    On,
    Error,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Off => "off",
            CameraStatus::Loading => "loading",
            CameraStatus::On => "on",
            CameraStatus::Error => "error",
        }
    }
}

/// Why a tick produced no sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The model found no face
    DetectionGap,
    /// No frame was ready, or the face lacked usable geometry
    InvalidFrame,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEnd {
    Stopped,
    Completed,
    Failed { reason: String },
}

/// Per-session tick counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub ticks: u32,
    pub samples: u32,
    pub detection_gaps: u32,
    pub invalid_frames: u32,
}

impl SessionStats {
    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::DetectionGap => self.detection_gaps += 1,
            SkipReason::InvalidFrame => self.invalid_frames += 1,
        }
    }
}

/// Windowed-mode aggregate for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAggregate {
    pub feature: FeatureKind,
    pub samples: usize,
    /// Unweighted mean, absent when no sample was collected
    pub mean: Option<f64>,
    /// Score written to the draft, absent when the metric was left untouched
    pub score: Option<WellnessScore>,
}

/// Result of closing a sampling window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub ticks: u32,
    pub aggregates: Vec<FeatureAggregate>,
}

impl WindowSummary {
    pub fn aggregate(&self, kind: FeatureKind) -> Option<&FeatureAggregate> {
        self.aggregates.iter().find(|a| a.feature == kind)
    }
}

/// What one session did, produced when it ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end: SessionEnd,
    pub stats: SessionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_point_count_covers_face_edge() {
        // Face edge right (454) is the highest named index
        assert_eq!(Landmark::required_point_count(), 455);
        assert!(Landmark::required_point_count() <= MESH_POINT_COUNT);
    }

    #[test]
    fn test_from_named_places_points() {
        let frame = LandmarkFrame::from_named(&[(Landmark::NoseTip, Point::new(0.4, 0.6))]);
        assert_eq!(frame.len(), MESH_POINT_COUNT);
        assert_eq!(frame.point(Landmark::NoseTip), Some(Point::new(0.4, 0.6)));
        assert!(frame.has_required_points());
    }

    #[test]
    fn test_short_frame_lacks_required_points() {
        let frame = LandmarkFrame::new(vec![Point::default(); 100]);
        assert!(!frame.has_required_points());
        assert_eq!(frame.point(Landmark::FaceEdgeRight), None);
    }

    #[test]
    fn test_feature_kind_parsing() {
        assert_eq!("eye_openness".parse::<FeatureKind>().unwrap(), FeatureKind::EyeOpenness);
        assert_eq!("eye-openness".parse::<FeatureKind>().unwrap(), FeatureKind::EyeOpenness);
        assert_eq!(
            "noseDisplacement".parse::<FeatureKind>().unwrap(),
            FeatureKind::NoseDisplacement
        );
        assert!("heart_rate".parse::<FeatureKind>().is_err());
    }

    #[test]
    fn test_wellness_score_range() {
        assert!(WellnessScore::new(5).is_ok());
        assert!(WellnessScore::new(6).is_err());
        assert!(!WellnessScore::UNSET.is_set());

        let parsed: Result<WellnessScore, _> = serde_json::from_str("7");
        assert!(parsed.is_err());
        assert_eq!(serde_json::to_string(&WellnessScore::level(3)).unwrap(), "3");
    }

    #[test]
    fn test_phase_camera_status() {
        assert_eq!(Phase::Idle.camera_status(), CameraStatus::Off);
        assert_eq!(Phase::Loading.camera_status(), CameraStatus::Loading);
        assert_eq!(
            Phase::Analyzing { remaining_ticks: 3 }.camera_status(),
            CameraStatus::On
        );
        assert_eq!(
            Phase::Error { message: "x".into() }.camera_status(),
            CameraStatus::Error
        );
        assert!(Phase::Active.is_sampling());
        assert!(!Phase::Complete.is_sampling());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::Analyzing { remaining_ticks: 4 }).unwrap();
        assert_eq!(json, r#"{"phase":"analyzing","remaining_ticks":4}"#);
    }
}
