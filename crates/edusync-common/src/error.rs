//! Error types for the sync job

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Every way one extract-filter-load cycle can fail.
///
/// All variants are fatal to the invocation; nothing is retried internally.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid invocation payload: {0}")]
    InvalidPayload(String),

    /// Document store unreachable or the collection is missing.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A timestamp field is present but cannot be parsed. `rows_written` is
    /// non-zero when the sink had already inserted rows before reaching it.
    #[error("Malformed timestamp in `{field}`: {value:?}")]
    MalformedTimestamp {
        field: String,
        value: String,
        rows_written: u64,
    },

    /// The relational connection could not be established or was lost.
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    /// An insert failed; `rows_written` rows were committed before it.
    #[error("Sink write failed after {rows_written} row(s): {reason}")]
    SinkWriteFailed { rows_written: u64, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub fn malformed_timestamp(field: impl Into<String>, value: impl Into<String>) -> Self {
        SyncError::MalformedTimestamp {
            field: field.into(),
            value: value.into(),
            rows_written: 0,
        }
    }

    /// Attach the count of rows the sink inserted before this error.
    ///
    /// Timestamp errors keep their kind; anything else raised while building
    /// a row becomes `SinkWriteFailed`.
    pub fn after_rows(self, written: u64) -> Self {
        match self {
            SyncError::MalformedTimestamp { field, value, .. } => SyncError::MalformedTimestamp {
                field,
                value,
                rows_written: written,
            },
            SyncError::SinkWriteFailed { reason, .. } => SyncError::SinkWriteFailed {
                rows_written: written,
                reason,
            },
            other => SyncError::SinkWriteFailed {
                rows_written: written,
                reason: other.to_string(),
            },
        }
    }

    /// Rows already written when the error was raised, if it came from the
    /// sink or from a timestamp it could not convert.
    pub fn rows_written(&self) -> Option<u64> {
        match self {
            SyncError::SinkWriteFailed { rows_written, .. }
            | SyncError::MalformedTimestamp { rows_written, .. } => Some(*rows_written),
            _ => None,
        }
    }
}
