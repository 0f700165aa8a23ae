//! Error types for rapid_accumulate
//!
//! Every failure a pipeline can observe is an [`AccumulateError`]: a stable
//! [`ErrorCode`] for programmatic matching, the [`StageKind`] that detected
//! it, a human-readable `message`, and optional partition / hint context.
//!
//! # Display format
//!
//! ```text
//! [reducer_failed] reduce: No way!
//! [reducer_failed] pivot: No way! (partition: same)
//! ```
//!
//! # JSON format
//!
//! ```json
//! {
//!   "code": "no_data",
//!   "stage": "reduce",
//!   "message": "No data or initial value"
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AccumulateError>;

/// Failure value returned by user callbacks (classifiers and reducers).
///
/// Anything convertible into a boxed error works: `"text".into()`,
/// `format!(..).into()`, or any `std::error::Error` type.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of fallible user callbacks.
pub type CallbackResult<T> = std::result::Result<T, CallbackError>;

// ─── Error codes ────────────────────────────────────────────────────────────

/// Stable, machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A classifier returned a failure.
    ClassifierFailed,
    /// A reducer returned a failure.
    ReducerFailed,
    /// `reduce` without an initial value was resolved before any datum arrived.
    NoData,
    /// A reduced value could not be turned into pivot record fields.
    SerializationFailed,
    /// Internal-consistency fault (should not occur in normal usage).
    Internal,
    /// The asynchronous worker is gone and can no longer accept actions.
    QueueClosed,
}

impl ErrorCode {
    /// Returns the snake_case name used in JSON and display output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifierFailed => "classifier_failed",
            Self::ReducerFailed => "reducer_failed",
            Self::NoData => "no_data",
            Self::SerializationFailed => "serialization_failed",
            Self::Internal => "internal",
            Self::QueueClosed => "queue_closed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of pipeline stage a failure was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The construction-time stage holding the initial input.
    Source,
    Reduce,
    Map,
    Filter,
    Sort,
    Pivot,
}

impl StageKind {
    /// Returns the user-facing name used in JSON, logs, and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Reduce => "reduce",
            Self::Map => "map",
            Self::Filter => "filter",
            Self::Sort => "sort",
            Self::Pivot => "pivot",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── AccumulateError ────────────────────────────────────────────────────────

/// A failure captured or raised by a pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {stage}: {message}{}", partition_suffix(.partition))]
pub struct AccumulateError {
    /// Stable error code for programmatic matching.
    pub code: ErrorCode,

    /// Stage that detected the failure.
    pub stage: StageKind,

    /// Human-readable description of the failure.
    pub message: String,

    /// Pivot partition key, when the failure came from one partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    /// Optional suggestion for how to fix or work around the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

fn partition_suffix(partition: &Option<String>) -> String {
    match partition {
        Some(key) => format!(" (partition: {key})"),
        None => String::new(),
    }
}

impl AccumulateError {
    /// Create a new error.
    pub fn new(code: ErrorCode, stage: StageKind, message: impl Into<String>) -> Self {
        Self {
            code,
            stage,
            message: message.into(),
            partition: None,
            hint: None,
        }
    }

    /// A classifier callback failed.
    pub fn classifier(err: CallbackError) -> Self {
        Self::new(ErrorCode::ClassifierFailed, StageKind::Pivot, err.to_string())
    }

    /// A reducer callback failed while folding the datum at `index`.
    pub fn reducer(err: CallbackError, index: usize) -> Self {
        Self::new(ErrorCode::ReducerFailed, StageKind::Reduce, err.to_string())
            .with_hint(format!("reducer failed at index {index}"))
    }

    /// A reduction without an initial value received no data.
    pub fn no_data() -> Self {
        Self::new(ErrorCode::NoData, StageKind::Reduce, "No data or initial value")
            .with_hint("Append at least one datum or supply an initial value")
    }

    /// Internal-consistency fault.
    pub fn internal(stage: StageKind, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, stage, message)
    }

    /// The asynchronous worker stopped before the action could run.
    pub fn queue_closed() -> Self {
        Self::new(
            ErrorCode::QueueClosed,
            StageKind::Source,
            "Action queue worker is no longer running",
        )
        .with_hint("Results must be awaited inside the runtime that created the pipeline")
    }

    /// Attach a hint suggesting how to fix or work around the failure.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Re-attribute a partition's failure to the pivot that owns it.
    pub fn in_partition(mut self, key: impl Into<String>) -> Self {
        self.stage = StageKind::Pivot;
        self.partition = Some(key.into());
        self
    }

    /// Check if this error reports a reduction that never saw data.
    pub fn is_no_data(&self) -> bool {
        self.code == ErrorCode::NoData
    }
}

impl From<serde_json::Error> for AccumulateError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationFailed, StageKind::Pivot, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AccumulateError::new(ErrorCode::ReducerFailed, StageKind::Reduce, "No way!");
        assert_eq!(err.to_string(), "[reducer_failed] reduce: No way!");

        let err = err.in_partition("same");
        assert_eq!(
            err.to_string(),
            "[reducer_failed] pivot: No way! (partition: same)"
        );
    }

    #[test]
    fn test_no_data() {
        let err = AccumulateError::no_data();
        assert!(err.is_no_data());
        assert_eq!(err.stage, StageKind::Reduce);
        assert!(err.hint.is_some());

        let err = AccumulateError::classifier("bad".into());
        assert!(!err.is_no_data());
    }

    #[test]
    fn test_reducer_error_keeps_callback_message() {
        let err = AccumulateError::reducer("overflow".into(), 4);
        assert_eq!(err.code, ErrorCode::ReducerFailed);
        assert_eq!(err.message, "overflow");
        assert_eq!(err.hint.as_deref(), Some("reducer failed at index 4"));
    }

    #[test]
    fn test_error_json_format() {
        let err = AccumulateError::new(ErrorCode::NoData, StageKind::Reduce, "empty");

        let value: serde_json::Value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], "no_data");
        assert_eq!(value["stage"], "reduce");
        assert_eq!(value["message"], "empty");
        // partition and hint are None → absent from JSON
        assert!(value.get("partition").is_none());
        assert!(value.get("hint").is_none());
    }

    #[test]
    fn test_error_serde_roundtrip() {
        let err = AccumulateError::classifier("unclassifiable".into())
            .in_partition("k")
            .with_hint("check the classifier");

        let json = serde_json::to_string(&err).unwrap();
        let back: AccumulateError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_error_is_std_error() {
        let err = AccumulateError::internal(StageKind::Pivot, "missing partition value");
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn test_code_names_match_serde() {
        for code in [
            ErrorCode::ClassifierFailed,
            ErrorCode::ReducerFailed,
            ErrorCode::NoData,
            ErrorCode::SerializationFailed,
            ErrorCode::Internal,
            ErrorCode::QueueClosed,
        ] {
            let value = serde_json::to_value(code).unwrap();
            assert_eq!(value, code.as_str());
        }
    }
}
