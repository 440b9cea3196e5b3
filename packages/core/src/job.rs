//! Job domain types for conversion requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
///
/// Job ids double as output directory names, so they are always generated
/// here and never taken from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the progress-channel destination of a job.
///
/// Opaque to the core; the connection layer decides what it means.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// What a caller hands over when submitting work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Content reference passed through to the extraction utility.
    pub source_reference: String,
    /// Session that receives the progress events.
    pub session_id: SessionId,
    /// Title used to name the deliverable.
    pub display_title: String,
}

impl JobRequest {
    pub fn new(
        source_reference: impl Into<String>,
        session_id: impl Into<SessionId>,
        display_title: impl Into<String>,
    ) -> Self {
        Self {
            source_reference: source_reference.into(),
            session_id: session_id.into(),
            display_title: display_title.into(),
        }
    }
}

/// A job represents one requested conversion.
///
/// Jobs live in memory only; nothing about them outlives the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Content reference, opaque to the queue.
    pub source_reference: String,
    /// Title used only for naming output.
    pub display_title: String,
    /// Progress-channel destination.
    pub session_id: SessionId,
    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job from a submission request.
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: JobId::new(),
            source_reference: request.source_reference,
            display_title: request.display_title,
            session_id: request.session_id,
            submitted_at: Utc::now(),
        }
    }
}
