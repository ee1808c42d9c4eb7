//! Parsing and validation of checkin.landmark_frame.v1 recordings

use crate::error::SignalError;
use crate::schema::frame_record::{FrameRecord, ValidationError};

/// Adapter for reading frame recordings
pub struct FrameRecordAdapter;

impl FrameRecordAdapter {
    /// Parse a JSON string containing an array of FrameRecords
    pub fn parse_array(json: &str) -> Result<Vec<FrameRecord>, SignalError> {
        let records: Vec<FrameRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing FrameRecords
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<FrameRecord>, SignalError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FrameRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(SignalError::ParseError(format!(
                        "line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse either a JSON array or NDJSON, picked by the first non-blank character
    pub fn parse(input: &str) -> Result<Vec<FrameRecord>, SignalError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Validate a batch of records; only failures are returned.
    ///
    /// Besides per-record checks, timestamps must not go backwards.
    pub fn validate_records(records: &[FrameRecord]) -> Vec<ValidationResult> {
        let mut failures = Vec::new();
        let mut previous: Option<f64> = None;

        for (idx, record) in records.iter().enumerate() {
            let result = record.validate().and_then(|()| match previous {
                Some(previous) if record.timestamp_ms < previous => {
                    Err(ValidationError::TimestampOrder {
                        previous,
                        actual: record.timestamp_ms,
                    })
                }
                _ => Ok(()),
            });

            match result {
                Ok(()) => previous = Some(record.timestamp_ms),
                Err(error) => failures.push(ValidationResult {
                    index: idx,
                    sequence: record.sequence,
                    error,
                }),
            }
        }

        failures
    }

    /// Parse and validate, failing on the first invalid record
    pub fn load(input: &str) -> Result<Vec<FrameRecord>, SignalError> {
        let records = Self::parse(input)?;
        if let Some(failure) = Self::validate_records(&records).into_iter().next() {
            return Err(SignalError::ParseError(format!(
                "record {} (sequence {}) is invalid: {}",
                failure.index, failure.sequence, failure.error
            )));
        }
        Ok(records)
    }
}

/// A record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub sequence: u64,
    pub error: ValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FRAME_SCHEMA_VERSION;

    fn line(sequence: u64, face: &str) -> String {
        format!(
            r#"{{"schema_version":"{FRAME_SCHEMA_VERSION}","sequence":{sequence},"timestamp_ms":{},"face":{face}}}"#,
            sequence * 16
        )
    }

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let input = format!("{}\n\n{}\n", line(0, "null"), line(1, "null"));
        let records = FrameRecordAdapter::parse_ndjson(&input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sequence, 1);
    }

    #[test]
    fn test_parse_ndjson_reports_line_number() {
        let input = format!("{}\n{{broken\n", line(0, "null"));
        let err = FrameRecordAdapter::parse_ndjson(&input).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_backwards_timestamp_flagged() {
        let mut records = FrameRecordAdapter::parse_ndjson(&format!(
            "{}\n{}\n{}\n",
            line(0, "null"),
            line(2, "null"),
            line(1, "null")
        ))
        .unwrap();
        records[2].sequence = 7;

        let failures = FrameRecordAdapter::validate_records(&records);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sequence, 7);
        assert_eq!(
            failures[0].error,
            ValidationError::TimestampOrder {
                previous: 32.0,
                actual: 16.0
            }
        );
    }

    #[test]
    fn test_parse_detects_array() {
        let input = format!("[{}, {}]", line(0, "null"), line(1, "null"));
        let records = FrameRecordAdapter::parse(&input).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_validate_records_returns_failures_only() {
        let input = format!("{}\n{}\n", line(0, "null"), line(1, r#"[{"x":0.5,"y":0.5}]"#));
        let records = FrameRecordAdapter::parse_ndjson(&input).unwrap();

        let failures = FrameRecordAdapter::validate_records(&records);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert!(matches!(failures[0].error, ValidationError::TooFewPoints { actual: 1, .. }));

        assert!(FrameRecordAdapter::load(&input).is_err());
    }
}
