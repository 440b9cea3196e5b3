//! Failure taxonomy for the job pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Generic text shown when the pipeline itself misbehaved.
const INTERNAL_MESSAGE: &str = "Server-side error during download processing. Please try again.";

/// Every way a job can end in an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The extraction utility is missing or misconfigured.
    #[error("extraction utility unavailable: {0}")]
    Configuration(String),

    /// The utility ran but exited non-zero or reported errors.
    #[error("conversion failed (exit code {exit_code:?}): {diagnostics}")]
    ConversionFailed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// The utility claimed success but left no media files behind.
    #[error("no media files were produced")]
    NoOutput,

    /// Renaming or archiving failed after a successful conversion.
    #[error("packaging failed: {0}")]
    Packaging(String),

    /// The job ran past its wall-clock limit.
    #[error("job exceeded its time limit of {0:?}")]
    Timeout(Duration),

    /// The owning session cancelled the job.
    #[error("job cancelled")]
    Cancelled,

    /// Anything unexpected inside the pipeline.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Serializable class of a [`JobError`], carried on `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    ConversionFailure,
    NoOutput,
    Packaging,
    Timeout,
    Cancelled,
    Internal,
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Configuration(_) => ErrorKind::Configuration,
            JobError::ConversionFailed { .. } => ErrorKind::ConversionFailure,
            JobError::NoOutput => ErrorKind::NoOutput,
            JobError::Packaging(_) => ErrorKind::Packaging,
            JobError::Timeout(_) => ErrorKind::Timeout,
            JobError::Cancelled => ErrorKind::Cancelled,
            JobError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Text placed in the terminal event sent to the client.
    ///
    /// Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            JobError::Configuration(detail) => {
                format!("Download service is not configured correctly: {detail}")
            }
            JobError::ConversionFailed { diagnostics, .. } if diagnostics.is_empty() => {
                "Download failed".to_string()
            }
            JobError::ConversionFailed { diagnostics, .. } => {
                format!("Download failed: {diagnostics}")
            }
            JobError::NoOutput => "Download finished but produced no audio files".to_string(),
            JobError::Packaging(_) => "Failed to process downloaded files".to_string(),
            JobError::Timeout(limit) => format!("Download timed out after {}", describe_limit(*limit)),
            JobError::Cancelled => "Download cancelled".to_string(),
            JobError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

fn describe_limit(limit: Duration) -> String {
    match limit.as_secs() {
        secs if limit.subsec_millis() == 0 && secs == 1 => "1 second".to_string(),
        secs if limit.subsec_millis() == 0 && secs > 0 => format!("{secs} seconds"),
        _ => format!("{} ms", limit.as_millis()),
    }
}
