//! Supervision of the external extraction utility.
//!
//! # Architecture
//!
//! - [`LineMatcher`] - classifies raw output lines
//! - [`ProgressTracker`] - turns classified lines into progress updates
//! - [`Extractor`] - probes, launches and supervises the utility process

mod parser;
mod runner;
mod tracker;

pub use parser::{LineMatcher, OutputLine, SpotdlMatcher};
pub use runner::{Extractor, RunSummary, sanitize_diagnostics};
pub use tracker::ProgressTracker;
