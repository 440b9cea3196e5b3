//! Progress event types delivered to sessions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, JobError, JobId};

/// Progress floor once the track list is known.
pub const PARSING_PROGRESS: f64 = 10.0;
/// Progress reported while packaging output.
pub const PACKAGING_PROGRESS: f64 = 95.0;
/// Progress of a completed job.
pub const COMPLETE_PROGRESS: f64 = 100.0;

/// Pipeline stage a job is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initializing,
    Parsing,
    Downloading,
    Packaging,
    Completed,
    Error,
}

impl Stage {
    /// Check if this stage ends a job's event sequence.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initializing => "initializing",
            Stage::Parsing => "parsing",
            Stage::Downloading => "downloading",
            Stage::Packaging => "packaging",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a progress value into `[0, 100]`, mapping NaN to 0.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, COMPLETE_PROGRESS)
    }
}

/// A non-terminal status snapshot, before it is stamped with a job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub progress: f64,
    pub message: String,
    pub current_track: Option<String>,
    pub total_tracks: u32,
    pub completed_tracks: u32,
}

impl ProgressUpdate {
    pub fn new(stage: Stage, progress: f64, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: clamp_progress(progress),
            message: message.into(),
            current_track: None,
            total_tracks: 0,
            completed_tracks: 0,
        }
    }

    /// First event of every job.
    pub fn initializing() -> Self {
        Self::new(Stage::Initializing, 0.0, "Starting download process...")
    }

    /// Sent while a job waits for a free slot.
    pub fn queued(ahead: usize) -> Self {
        Self::new(
            Stage::Initializing,
            0.0,
            format!("Queued, {ahead} job(s) ahead"),
        )
    }

    /// Sent right before the output is packaged.
    pub fn packaging(total_tracks: u32) -> Self {
        Self {
            total_tracks,
            completed_tracks: total_tracks,
            ..Self::new(Stage::Packaging, PACKAGING_PROGRESS, "Packaging files...")
        }
    }

    pub fn with_tracks(mut self, completed: u32, total: u32) -> Self {
        self.total_tracks = total;
        self.completed_tracks = if total > 0 { completed.min(total) } else { completed };
        self
    }

    pub fn with_current_track(mut self, track: Option<String>) -> Self {
        self.current_track = track;
        self
    }
}

/// Where a finished job's deliverable can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// URL path the static file layer serves the deliverable under.
    pub download_url: String,
    /// Path of the deliverable inside the output store.
    pub deliverable_path: PathBuf,
    /// Suggested client-visible file name.
    pub filename: String,
    /// Number of media files in the deliverable.
    pub total_files: usize,
}

/// An immutable snapshot of job status, as delivered to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub stage: Stage,
    pub progress: f64,
    pub message: String,
    pub current_track: Option<String>,
    pub total_tracks: u32,
    pub completed_tracks: u32,
    /// Present on `completed` events only.
    #[serde(flatten)]
    pub delivery: Option<Delivery>,
    /// Present on `error` events only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Stamp a non-terminal update with its job.
    pub fn progress(job_id: JobId, update: ProgressUpdate) -> Self {
        Self {
            job_id,
            stage: update.stage,
            progress: clamp_progress(update.progress),
            message: update.message,
            current_track: update.current_track,
            total_tracks: update.total_tracks,
            completed_tracks: update.completed_tracks,
            delivery: None,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    /// Terminal success event.
    pub fn completed(job_id: JobId, last: &ProgressUpdate, delivery: Delivery) -> Self {
        let total = last.total_tracks.max(delivery.total_files as u32);
        Self {
            job_id,
            stage: Stage::Completed,
            progress: COMPLETE_PROGRESS,
            message: format!("Ready: {}", delivery.filename),
            current_track: None,
            total_tracks: total,
            completed_tracks: total,
            delivery: Some(delivery),
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    /// Terminal failure event; progress stays where the job stopped.
    pub fn failed(job_id: JobId, last: &ProgressUpdate, error: &JobError) -> Self {
        Self {
            job_id,
            stage: Stage::Error,
            progress: clamp_progress(last.progress),
            message: error.client_message(),
            current_track: last.current_track.clone(),
            total_tracks: last.total_tracks,
            completed_tracks: last.completed_tracks,
            delivery: None,
            error_kind: Some(error.kind()),
            timestamp: Utc::now(),
        }
    }

    /// Check if this event ends the job's sequence.
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// Receiver of non-terminal progress, implemented by whatever publishes it.
pub trait ProgressSink {
    fn emit(&mut self, update: ProgressUpdate);
}

impl ProgressSink for Vec<ProgressUpdate> {
    fn emit(&mut self, update: ProgressUpdate) {
        self.push(update);
    }
}
