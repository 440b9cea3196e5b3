//! Progress state machine driven by classified output lines.

use ripline_core::{PARSING_PROGRESS, ProgressUpdate, Stage};

use crate::parser::OutputLine;

/// Share of the progress bar spent downloading (10% → 90%).
const DOWNLOAD_SPAN: f64 = 80.0;
/// Reported while downloading with an unknown track count.
const UNKNOWN_TOTAL_DOWNLOADING: f64 = 50.0;
/// Reported after a download finished with an unknown track count.
const UNKNOWN_TOTAL_DOWNLOADED: f64 = 80.0;

/// Track counters for one run of the utility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    total_tracks: u32,
    completed_tracks: u32,
    current_track: Option<String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_tracks(&self) -> u32 {
        self.total_tracks
    }

    pub fn completed_tracks(&self) -> u32 {
        self.completed_tracks
    }

    /// Advance on one output line; returns the update to publish, if any.
    pub fn observe(&mut self, line: &OutputLine) -> Option<ProgressUpdate> {
        match line {
            OutputLine::Found { count } => {
                self.total_tracks = *count;
                self.completed_tracks = self.completed_tracks.min(self.total_tracks);
                let plural = if *count == 1 { "" } else { "s" };
                Some(
                    ProgressUpdate::new(
                        Stage::Parsing,
                        PARSING_PROGRESS,
                        format!("Found {count} track{plural}"),
                    )
                    .with_tracks(0, self.total_tracks),
                )
            }
            OutputLine::Downloading { name } => {
                self.current_track = Some(name.clone());
                let message = if self.total_tracks > 0 {
                    format!(
                        "Downloading track {} of {}",
                        (self.completed_tracks + 1).min(self.total_tracks),
                        self.total_tracks
                    )
                } else {
                    format!("Downloading track {}", self.completed_tracks + 1)
                };
                Some(self.downloading(UNKNOWN_TOTAL_DOWNLOADING, message))
            }
            OutputLine::Downloaded { name } => {
                self.completed_tracks = self.completed_tracks.saturating_add(1);
                if self.total_tracks > 0 {
                    self.completed_tracks = self.completed_tracks.min(self.total_tracks);
                }
                if let Some(name) = name {
                    self.current_track = Some(name.clone());
                }
                let message = if self.total_tracks > 0 {
                    format!(
                        "Downloaded {} of {} tracks",
                        self.completed_tracks, self.total_tracks
                    )
                } else {
                    format!("Downloaded {} tracks", self.completed_tracks)
                };
                Some(self.downloading(UNKNOWN_TOTAL_DOWNLOADED, message))
            }
            OutputLine::Other => None,
        }
    }

    fn downloading(&self, unknown_total: f64, message: String) -> ProgressUpdate {
        let progress = if self.total_tracks > 0 {
            PARSING_PROGRESS
                + (self.completed_tracks as f64 / self.total_tracks as f64) * DOWNLOAD_SPAN
        } else {
            unknown_total
        };
        ProgressUpdate::new(Stage::Downloading, progress, message)
            .with_tracks(self.completed_tracks, self.total_tracks)
            .with_current_track(self.current_track.clone())
    }
}
