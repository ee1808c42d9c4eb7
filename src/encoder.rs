//! Check-in snapshot encoding
//!
//! This module encodes a check-in draft, and optionally the report of the
//! session that filled it, into a versioned JSON document. Unset metrics are
//! written as `null`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::draft::CheckinDraft;
use crate::error::SignalError;
use crate::types::{Metric, SessionReport};
use crate::{CHECKIN_SIGNALS_VERSION, PRODUCER_NAME};

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Per-metric scores, `None` when unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotScores {
    pub sleep: Option<u8>,
    pub stress: Option<u8>,
    pub tension: Option<u8>,
    pub mood: Option<u8>,
    pub focus: Option<u8>,
}

impl SnapshotScores {
    pub fn from_draft(draft: &CheckinDraft) -> Self {
        let score = |metric: Metric| {
            let score = draft.get(metric);
            score.is_set().then(|| score.value())
        };
        Self {
            sleep: score(Metric::Sleep),
            stress: score(Metric::Stress),
            tension: score(Metric::Tension),
            mood: score(Metric::Mood),
            focus: score(Metric::Focus),
        }
    }
}

/// Encoded check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinSnapshot {
    pub snapshot_version: String,
    pub producer: SnapshotProducer,
    pub computed_at_utc: String,
    pub scores: SnapshotScores,
    /// Text form of the set scores, e.g. `Sleep quality: 4/5, Mood: 3/5`
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionReport>,
}

/// Snapshot encoder
pub struct SnapshotEncoder {
    instance_id: String,
}

impl Default for SnapshotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(&self, draft: &CheckinDraft, session: Option<&SessionReport>) -> CheckinSnapshot {
        CheckinSnapshot {
            snapshot_version: SNAPSHOT_VERSION.to_string(),
            producer: SnapshotProducer {
                name: PRODUCER_NAME.to_string(),
                version: CHECKIN_SIGNALS_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            scores: SnapshotScores::from_draft(draft),
            summary: draft.text_summary(),
            session: session.cloned(),
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        draft: &CheckinDraft,
        session: Option<&SessionReport>,
    ) -> Result<String, SignalError> {
        let snapshot = self.encode(draft, session);
        serde_json::to_string_pretty(&snapshot).map_err(SignalError::JsonError)
    }
}
