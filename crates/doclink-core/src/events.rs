//! Document processing events as they travel over the push channel.
//!
//! The wire shape is a flat JSON object:
//!
//! ```json
//! {
//!   "type": "PROGRESS_UPDATE",
//!   "documentId": "doc-1",
//!   "progress": 42.5,
//!   "timestamp": "2026-01-01T00:00:00Z"
//! }
//! ```
//!
//! `status`, `progress`, and `message` are optional and omitted when absent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

/// Upper bound for `progress` (inclusive).
pub const MAX_PROGRESS: f64 = 100.0;

// ─────────────────────────────────────────────────────────────────────────────
// Vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of state change an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// The document moved to a new processing status.
    StatusUpdate,
    /// Processing advanced; carries `progress`.
    ProgressUpdate,
    /// Processing failed; carries `message`.
    Error,
    /// Processing finished; carries the terminal `status`.
    Completed,
}

impl EventKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusUpdate => "STATUS_UPDATE",
            Self::ProgressUpdate => "PROGRESS_UPDATE",
            Self::Error => "ERROR",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend processing status of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Uploaded and waiting for processing.
    Uploaded,
    /// Currently being processed.
    Processing,
    /// Processed and validated successfully.
    Validated,
    /// Processing failed.
    Failed,
}

impl ProcessingStatus {
    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Uploaded => "Document uploaded and waiting for processing",
            Self::Processing => "Document is being processed",
            Self::Validated => "Document processed and validated successfully",
            Self::Failed => "Document processing failed",
        }
    }

    /// Terminal state: no further transitions expected.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Validated | Self::Failed)
    }

    /// Whether the backend is actively working on the document.
    pub fn is_in_progress(self) -> bool {
        self == Self::Processing
    }

    /// Whether the document is eligible to start processing.
    pub fn can_be_processed(self) -> bool {
        self == Self::Uploaded
    }

    /// Wire name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "UPLOADED",
            Self::Processing => "PROCESSING",
            Self::Validated => "VALIDATED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DocumentEvent
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable notification about one document's processing state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvent {
    /// Event kind (`type` on the wire).
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Document the event concerns. Missing or empty means "no subject".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// New processing status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProcessingStatus>,
    /// Completion percentage, 0–100. Fractional values are allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Error description (used with [`EventKind::Error`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl DocumentEvent {
    fn base(kind: EventKind, document_id: impl Into<String>) -> Self {
        Self {
            kind,
            document_id: Some(document_id.into()),
            status: None,
            progress: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// A `STATUS_UPDATE` event stamped now.
    pub fn status_update(document_id: impl Into<String>, status: ProcessingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::base(EventKind::StatusUpdate, document_id)
        }
    }

    /// A `PROGRESS_UPDATE` event stamped now.
    ///
    /// `progress` is clamped to 0–100; a non-finite value becomes 0.
    pub fn progress_update(document_id: impl Into<String>, progress: impl Into<f64>) -> Self {
        let progress = progress.into();
        let progress = if progress.is_finite() {
            progress.clamp(0.0, MAX_PROGRESS)
        } else {
            0.0
        };
        Self {
            progress: Some(progress),
            ..Self::base(EventKind::ProgressUpdate, document_id)
        }
    }

    /// An `ERROR` event stamped now.
    pub fn error(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::base(EventKind::Error, document_id)
        }
    }

    /// A `COMPLETED` event stamped now.
    pub fn completed(document_id: impl Into<String>, status: ProcessingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::base(EventKind::Completed, document_id)
        }
    }

    /// The routing subject, if one can be resolved.
    ///
    /// Events without a subject are only deliverable to global subscribers.
    pub fn subject(&self) -> Option<&str> {
        self.document_id.as_deref().filter(|id| !id.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

/// Decode one inbound text frame.
///
/// Rejects anything that does not match the wire shape, including unknown
/// event types, unparseable timestamps, and `progress` outside 0–100.
pub fn decode_event(text: &str) -> Result<DocumentEvent, DecodeError> {
    let event: DocumentEvent =
        serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;
    if let Some(progress) = event.progress {
        if !(0.0..=MAX_PROGRESS).contains(&progress) {
            return Err(DecodeError::ProgressOutOfRange(progress));
        }
    }
    Ok(event)
}

/// Encode an event into its wire form.
pub fn encode_event(event: &DocumentEvent) -> String {
    // All fields are plain data; serialization cannot fail.
    serde_json::to_string(event).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decode_progress_update() {
        let event = decode_event(
            r#"{"type":"PROGRESS_UPDATE","documentId":"doc-1","progress":42,"timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::ProgressUpdate);
        assert_eq!(event.subject(), Some("doc-1"));
        assert_eq!(event.progress, Some(42.0));
        assert!(event.status.is_none());
    }

    #[test]
    fn decode_completed_with_status() {
        let event = decode_event(
            r#"{"type":"COMPLETED","documentId":"doc-1","status":"VALIDATED","timestamp":"2026-01-01T00:00:05.123Z"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Completed);
        assert_eq!(event.status, Some(ProcessingStatus::Validated));
    }

    #[test]
    fn decode_error_with_message() {
        let event = decode_event(
            r#"{"type":"ERROR","documentId":"d","message":"OCR engine crashed","timestamp":"2026-01-01T00:00:00+02:00"}"#,
        )
        .unwrap();
        assert_eq!(event.message.as_deref(), Some("OCR engine crashed"));
    }

    #[test]
    fn decode_without_document_id_has_no_subject() {
        let event =
            decode_event(r#"{"type":"STATUS_UPDATE","status":"PROCESSING","timestamp":"2026-01-01T00:00:00Z"}"#)
                .unwrap();
        assert!(event.subject().is_none());
    }

    #[test]
    fn empty_document_id_has_no_subject() {
        let event = decode_event(
            r#"{"type":"STATUS_UPDATE","documentId":"","timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(event.subject().is_none());
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = decode_event(
            r#"{"type":"EXPLODED","documentId":"d","timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap_err();
        assert_matches!(err, DecodeError::Json(_));
    }

    #[test]
    fn decode_rejects_bad_timestamp() {
        let err = decode_event(r#"{"type":"ERROR","documentId":"d","timestamp":"yesterday"}"#)
            .unwrap_err();
        assert_matches!(err, DecodeError::Json(_));
    }

    #[test]
    fn decode_rejects_missing_timestamp() {
        assert!(decode_event(r#"{"type":"ERROR","documentId":"d"}"#).is_err());
    }

    #[test]
    fn decode_rejects_progress_over_100() {
        let err = decode_event(
            r#"{"type":"PROGRESS_UPDATE","documentId":"d","progress":150,"timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::ProgressOutOfRange(150.0));
    }

    #[test]
    fn decode_rejects_negative_progress() {
        let err = decode_event(
            r#"{"type":"PROGRESS_UPDATE","documentId":"d","progress":-1,"timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::ProgressOutOfRange(-1.0));
    }

    fn progress_frame(progress: &str) -> String {
        format!(
            r#"{{"type":"PROGRESS_UPDATE","documentId":"doc-1","progress":{progress},"timestamp":"2026-01-01T00:00:00Z"}}"#
        )
    }

    #[test]
    fn decode_accepts_fractional_progress() {
        let event = decode_event(&progress_frame("42.5")).unwrap();
        assert_eq!(event.progress, Some(42.5));
        assert_eq!(event.subject(), Some("doc-1"));
    }

    #[test]
    fn decode_accepts_progress_bounds() {
        assert_eq!(decode_event(&progress_frame("0")).unwrap().progress, Some(0.0));
        assert_eq!(decode_event(&progress_frame("100")).unwrap().progress, Some(100.0));
        assert_eq!(decode_event(&progress_frame("100.0")).unwrap().progress, Some(100.0));
    }

    #[test]
    fn decode_rejects_progress_just_over_100() {
        let err = decode_event(&progress_frame("100.5")).unwrap_err();
        assert_eq!(err, DecodeError::ProgressOutOfRange(100.5));
    }

    #[test]
    fn decode_rejects_non_json() {
        assert_matches!(decode_event("not json at all"), Err(DecodeError::Json(_)));
    }

    #[test]
    fn decode_rejects_unknown_status() {
        assert!(
            decode_event(
                r#"{"type":"STATUS_UPDATE","documentId":"d","status":"ARCHIVED","timestamp":"2026-01-01T00:00:00Z"}"#,
            )
            .is_err()
        );
    }

    #[test]
    fn encode_omits_absent_fields() {
        let event = DocumentEvent::progress_update("doc-9", 10);
        let json: serde_json::Value = serde_json::from_str(&encode_event(&event)).unwrap();
        assert_eq!(json["type"], "PROGRESS_UPDATE");
        assert_eq!(json["documentId"], "doc-9");
        assert_eq!(json["progress"], 10.0);
        assert!(json.get("status").is_none());
        assert!(json.get("message").is_none());
        assert!(json["timestamp"].as_str().is_some());
    }

    #[test]
    fn encoded_event_decodes_back() {
        let event = DocumentEvent::completed("doc-1", ProcessingStatus::Failed);
        let back = decode_event(&encode_event(&event)).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn constructors_set_kind_and_payload() {
        let s = DocumentEvent::status_update("a", ProcessingStatus::Processing);
        assert_eq!(s.kind, EventKind::StatusUpdate);
        assert_eq!(s.status, Some(ProcessingStatus::Processing));

        let e = DocumentEvent::error("a", "boom");
        assert_eq!(e.kind, EventKind::Error);
        assert_eq!(e.message.as_deref(), Some("boom"));

        let c = DocumentEvent::completed("a", ProcessingStatus::Validated);
        assert_eq!(c.kind, EventKind::Completed);
    }

    #[test]
    fn progress_constructor_clamps() {
        assert_eq!(DocumentEvent::progress_update("a", 200).progress, Some(100.0));
        assert_eq!(DocumentEvent::progress_update("a", -3.5).progress, Some(0.0));
        assert_eq!(DocumentEvent::progress_update("a", f64::NAN).progress, Some(0.0));
        assert_eq!(DocumentEvent::progress_update("a", 12.25).progress, Some(12.25));
    }

    #[test]
    fn status_predicates() {
        assert!(ProcessingStatus::Validated.is_completed());
        assert!(ProcessingStatus::Failed.is_completed());
        assert!(!ProcessingStatus::Processing.is_completed());
        assert!(ProcessingStatus::Processing.is_in_progress());
        assert!(ProcessingStatus::Uploaded.can_be_processed());
        assert!(!ProcessingStatus::Failed.can_be_processed());
    }

    #[test]
    fn status_display_matches_wire() {
        for status in [
            ProcessingStatus::Uploaded,
            ProcessingStatus::Processing,
            ProcessingStatus::Validated,
            ProcessingStatus::Failed,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, status.to_string());
            assert!(!status.description().is_empty());
        }
    }

    #[test]
    fn kind_display_matches_wire() {
        let wire = serde_json::to_value(EventKind::ProgressUpdate).unwrap();
        assert_eq!(wire, EventKind::ProgressUpdate.to_string());
    }
}
