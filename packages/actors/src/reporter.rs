//! Per-job progress publisher.

use std::sync::Arc;

use ripline_core::{
    Delivery, Job, JobError, JobId, ProgressEvent, ProgressSink, ProgressUpdate, SessionId,
};

use crate::channel::ProgressChannel;

/// Publishes one job's events to its session.
///
/// Progress never goes backwards. The terminal methods take `self`, so a
/// job can end exactly once and nothing is published after it.
pub struct ProgressReporter {
    job_id: JobId,
    session_id: SessionId,
    channel: Arc<dyn ProgressChannel>,
    last: ProgressUpdate,
}

impl ProgressReporter {
    pub fn new(job: &Job, channel: Arc<dyn ProgressChannel>) -> Self {
        Self {
            job_id: job.id,
            session_id: job.session_id.clone(),
            channel,
            last: ProgressUpdate::initializing(),
        }
    }

    /// Publish a non-terminal update, holding progress at its high-water mark.
    pub fn report(&mut self, mut update: ProgressUpdate) {
        if update.stage.is_terminal() {
            tracing::warn!(job_id = %self.job_id, stage = %update.stage, "Terminal stage passed to report, ignored");
            return;
        }
        update.progress = update.progress.max(self.last.progress);
        let (completed, total) = (update.completed_tracks, update.total_tracks);
        update = update.with_tracks(completed, total);

        self.channel.publish(
            &self.session_id,
            ProgressEvent::progress(self.job_id, update.clone()),
        );
        self.last = update;
    }

    /// Publish the `completed` event.
    pub fn complete(self, delivery: Delivery) -> ProgressEvent {
        let event = ProgressEvent::completed(self.job_id, &self.last, delivery);
        self.channel.publish(&self.session_id, event.clone());
        event
    }

    /// Publish the `error` event.
    pub fn fail(self, error: &JobError) -> ProgressEvent {
        let event = ProgressEvent::failed(self.job_id, &self.last, error);
        self.channel.publish(&self.session_id, event.clone());
        event
    }
}

impl ProgressSink for ProgressReporter {
    fn emit(&mut self, update: ProgressUpdate) {
        self.report(update);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::path::PathBuf;
    use std::sync::Mutex;

    use ripline_core::{JobRequest, Stage};

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(SessionId, ProgressEvent)>>);

    impl ProgressChannel for Recorder {
        fn publish(&self, session_id: &SessionId, event: ProgressEvent) {
            self.0
                .lock()
                .expect("recorder lock")
                .push((session_id.clone(), event));
        }
    }

    impl Recorder {
        fn events(&self) -> Vec<ProgressEvent> {
            self.0
                .lock()
                .expect("recorder lock")
                .iter()
                .map(|(_, e)| e.clone())
                .collect()
        }
    }

    fn job() -> Job {
        Job::new(JobRequest::new("ref", "session-1", "Title"))
    }

    #[test]
    fn progress_never_decreases() {
        let recorder = Arc::new(Recorder::default());
        let mut reporter = ProgressReporter::new(&job(), recorder.clone());

        reporter.report(ProgressUpdate::new(Stage::Downloading, 50.0, "a"));
        reporter.report(ProgressUpdate::new(Stage::Downloading, 20.0, "b"));
        reporter.report(ProgressUpdate::packaging(2));

        let progress: Vec<f64> = recorder.events().iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![50.0, 50.0, 95.0]);
    }

    #[test]
    fn terminal_events_close_the_sequence() {
        let recorder = Arc::new(Recorder::default());
        let mut reporter = ProgressReporter::new(&job(), recorder.clone());
        reporter.report(ProgressUpdate::new(Stage::Downloading, 30.0, "a").with_tracks(1, 3));

        let event = reporter.fail(&JobError::NoOutput);
        assert_eq!(event.stage, Stage::Error);
        assert_eq!(event.progress, 30.0);

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().is_some_and(|e| e.is_terminal()));
    }

    #[test]
    fn completion_carries_delivery() {
        let recorder = Arc::new(Recorder::default());
        let job = job();
        let reporter = ProgressReporter::new(&job, recorder.clone());
        let event = reporter.complete(Delivery {
            download_url: format!("/downloads/{}/Title.mp3", job.id),
            deliverable_path: PathBuf::from("Title.mp3"),
            filename: "Title.mp3".into(),
            total_files: 1,
        });
        assert_eq!(event.progress, 100.0);
        assert_eq!(event.total_tracks, 1);
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn terminal_stages_are_rejected_by_report() {
        let recorder = Arc::new(Recorder::default());
        let mut reporter = ProgressReporter::new(&job(), recorder.clone());
        reporter.report(ProgressUpdate::new(Stage::Completed, 100.0, "nope"));
        assert!(recorder.events().is_empty());
    }
}
