use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A recording is already open: {handle}")]
    AlreadyRecording { handle: String },

    #[error("No open recording for handle: {0}")]
    UnknownRecording(String),

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Manual session failed: {0}")]
    ManualSessionFailed(#[source] ExecutorError),

    #[error("Failed to write {path}: {source}")]
    PersistenceWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    PersistenceReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupted document {path}: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Errors a step executor may report for a single attempt.
///
/// `Ok(false)` from an executor is the normal way to say "the step did not
/// work"; these variants cover the cases where the attempt could not even be
/// judged.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("step timed out")]
    Timeout,

    /// Transport-level failure. Ends the retry loop for the current step.
    #[error("unrecoverable executor error: {0}")]
    Unrecoverable(String),

    #[error("step failed: {0}")]
    StepFailed(String),
}

impl ExecutorError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ExecutorError::Unrecoverable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        let err = EngineError::TemplateNotFound("abc".into());
        assert_eq!(err.to_string(), "Template not found: abc");

        let err = EngineError::AlreadyRecording {
            handle: "h-1".into(),
        };
        assert_eq!(err.to_string(), "A recording is already open: h-1");
    }

    #[test]
    fn persistence_error_keeps_source() {
        let err = EngineError::PersistenceWriteFailed {
            path: PathBuf::from("/tmp/x.json"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.to_string(), "Failed to write /tmp/x.json: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn unrecoverable_is_not_recoverable() {
        assert!(ExecutorError::Timeout.is_recoverable());
        assert!(ExecutorError::StepFailed("nope".into()).is_recoverable());
        assert!(!ExecutorError::Unrecoverable("socket closed".into()).is_recoverable());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
        assert_send_sync::<ExecutorError>();
    }
}
