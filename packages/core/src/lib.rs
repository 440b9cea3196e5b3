//! Core domain types for the conversion service.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and SessionId for submitted work
//! - ProgressUpdate and ProgressEvent for per-session status
//! - JobError for the failure taxonomy
//! - RiplineConfig for runtime configuration

mod config;
mod error;
mod events;
mod job;
mod queue;

pub use config::{ConfigError, ExtractorSettings, RiplineConfig};
pub use error::{ErrorKind, JobError};
pub use events::{
    COMPLETE_PROGRESS, Delivery, PACKAGING_PROGRESS, PARSING_PROGRESS, ProgressEvent,
    ProgressSink, ProgressUpdate, Stage, clamp_progress,
};
pub use job::{Job, JobId, JobRequest, SessionId};
pub use queue::QueueStats;
