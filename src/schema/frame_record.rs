//! checkin.landmark_frame.v1 schema definition
//!
//! One record per captured frame, as written by a recorder or a test
//! harness:
//! - `ready: false` marks a frame the camera had not decoded yet
//! - `face: null` marks a frame in which the model found no face
//! - otherwise `face` holds the full normalized mesh

use serde::{Deserialize, Serialize};

use crate::types::{Landmark, LandmarkFrame, Point};

/// Current schema version
pub const FRAME_SCHEMA_VERSION: &str = "checkin.landmark_frame.v1";

fn default_ready() -> bool {
    true
}

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Schema version (must be "checkin.landmark_frame.v1")
    pub schema_version: String,
    /// Frame counter within the recording
    #[serde(default)]
    pub sequence: u64,
    /// Capture time in milliseconds since the recording started
    pub timestamp_ms: f64,
    /// Whether the camera had a decodable frame
    #[serde(default = "default_ready")]
    pub ready: bool,
    /// Detected face mesh, `null` when no face was found
    #[serde(default)]
    pub face: Option<LandmarkFrame>,
}

impl FrameRecord {
    /// A ready frame with a detected face
    pub fn with_face(sequence: u64, timestamp_ms: f64, face: LandmarkFrame) -> Self {
        Self {
            schema_version: FRAME_SCHEMA_VERSION.to_string(),
            sequence,
            timestamp_ms,
            ready: true,
            face: Some(face),
        }
    }

    /// A ready frame in which no face was found
    pub fn without_face(sequence: u64, timestamp_ms: f64) -> Self {
        Self {
            face: None,
            ..Self::with_face(sequence, timestamp_ms, LandmarkFrame::default())
        }
    }

    /// A frame the camera had not decoded yet
    pub fn not_ready(sequence: u64, timestamp_ms: f64) -> Self {
        Self {
            ready: false,
            ..Self::without_face(sequence, timestamp_ms)
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != FRAME_SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: FRAME_SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if !self.timestamp_ms.is_finite() || self.timestamp_ms < 0.0 {
            return Err(ValidationError::InvalidTimestamp(self.timestamp_ms));
        }

        if let Some(face) = &self.face {
            if !self.ready {
                return Err(ValidationError::FaceOnUnreadyFrame);
            }
            if !face.has_required_points() {
                return Err(ValidationError::TooFewPoints {
                    required: Landmark::required_point_count(),
                    actual: face.len(),
                });
            }
            if let Some(index) = face.points().iter().position(|p: &Point| !p.is_finite()) {
                return Err(ValidationError::NonFinitePoint { index });
            }
        }

        Ok(())
    }
}

/// Validation errors for frame records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f64),

    #[error("Frame is marked not ready but carries a face")]
    FaceOnUnreadyFrame,

    #[error("Face mesh has {actual} points, needs at least {required}")]
    TooFewPoints { required: usize, actual: usize },

    #[error("Timestamp {actual} precedes the previous frame's {previous}")]
    TimestampOrder { previous: f64, actual: f64 },

    #[error("Face point {index} is not finite")]
    NonFinitePoint { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::neutral_face;
    use crate::types::MESH_POINT_COUNT;

    #[test]
    fn test_ready_defaults_to_true() {
        let json =
            r#"{"schema_version":"checkin.landmark_frame.v1","timestamp_ms":16.0,"face":null}"#;
        let record: FrameRecord = serde_json::from_str(json).unwrap();
        assert!(record.ready);
        assert_eq!(record.sequence, 0);
        assert!(record.face.is_none());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_face_serializes_as_point_array() {
        let record = FrameRecord::with_face(3, 48.0, neutral_face(Point::new(0.5, 0.5)));
        let value = serde_json::to_value(&record).unwrap();
        let face = value["face"].as_array().unwrap();
        assert_eq!(face.len(), MESH_POINT_COUNT);
        assert_eq!(face[1]["x"], 0.5);

        let parsed: FrameRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut record = FrameRecord::without_face(0, 0.0);
        record.schema_version = "checkin.landmark_frame.v0".to_string();
        assert!(matches!(
            record.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_truncated_mesh_rejected() {
        let record =
            FrameRecord::with_face(0, 0.0, LandmarkFrame::new(vec![Point::new(0.5, 0.5); 10]));
        assert_eq!(
            record.validate(),
            Err(ValidationError::TooFewPoints {
                required: Landmark::required_point_count(),
                actual: 10
            })
        );
    }

    #[test]
    fn test_unready_frame_with_face_rejected() {
        let mut record = FrameRecord::with_face(0, 0.0, neutral_face(Point::new(0.5, 0.5)));
        record.ready = false;
        assert_eq!(record.validate(), Err(ValidationError::FaceOnUnreadyFrame));
    }
}
