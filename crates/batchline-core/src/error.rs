//! Job error taxonomy
//!
//! Errors raised by collaborators (`anyhow::Error`) are flattened into
//! messages so that a [`JobError`] can be cloned into report snapshots and
//! serialised with the rest of a [`crate::JobReport`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine-internal operations
pub type JobResult<T> = std::result::Result<T, JobError>;

/// Everything that can end up in a report's `last_error`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobError {
    #[error("Unable to open record reader: {0}")]
    ReaderOpen(String),

    #[error("Unable to read next record: {0}")]
    ReaderRead(String),

    #[error("Unable to close record reader: {0}")]
    ReaderClose(String),

    #[error("Unable to process record {record}: {message}")]
    Stage { record: u64, message: String },

    #[error("Unable to open record writer: {0}")]
    WriterOpen(String),

    #[error("Unable to write records: {0}")]
    WriterWrite(String),

    #[error("Unable to close record writer: {0}")]
    WriterClose(String),

    #[error("Error threshold exceeded: {errors} errors > threshold {threshold}")]
    ErrorThresholdExceeded { threshold: u64, errors: u64 },

    #[error("Job task aborted: {0}")]
    TaskAborted(String),

    #[error("Job executor is shut down")]
    ExecutorShutdown,
}

impl JobError {
    /// Fatal errors stop the job; recoverable ones are counted and skipped
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            JobError::Stage { .. } | JobError::ReaderClose(_) | JobError::WriterClose(_)
        )
    }
}

/// Render an `anyhow` error with its cause chain ("outer: inner: root")
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_describe_keeps_cause_chain() {
        let err = std::fs::read("/definitely/not/here")
            .context("Failed to load input")
            .unwrap_err();
        let message = describe(&err);
        assert!(message.starts_with("Failed to load input: "));
    }

    #[test]
    fn test_fatality() {
        assert!(!JobError::Stage {
            record: 1,
            message: "bad".into()
        }
        .is_fatal());
        assert!(!JobError::WriterClose("disk".into()).is_fatal());
        assert!(JobError::WriterWrite("disk".into()).is_fatal());
        assert!(JobError::ErrorThresholdExceeded {
            threshold: 1,
            errors: 2
        }
        .is_fatal());
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(JobError::ReaderRead("eof".into())).unwrap();
        assert_eq!(json["kind"], "reader_read");
        assert_eq!(json["detail"], "eof");
    }
}
