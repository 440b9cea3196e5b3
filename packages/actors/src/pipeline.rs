//! What runs inside a worker slot.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use extractor::Extractor;
use futures_util::FutureExt;
use ripline_core::{Delivery, Job, JobError, ProgressUpdate, RiplineConfig};
use storage::{OutputStore, StorageError};
use tokio_util::sync::CancellationToken;

use crate::reporter::ProgressReporter;

/// Future type for pipeline runs.
pub type PipelineFuture<'a> = Pin<Box<dyn Future<Output = Result<Delivery, JobError>> + Send + 'a>>;

/// Trait for job pipelines.
///
/// A pipeline reports non-terminal progress through the reporter and
/// returns the deliverable or the error. The queue publishes the terminal
/// event from that result.
pub trait JobPipeline: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        job: &'a Job,
        reporter: &'a mut ProgressReporter,
        cancel: CancellationToken,
    ) -> PipelineFuture<'a>;
}

/// Probe, convert, package.
pub struct ConversionPipeline {
    extractor: Extractor,
    store: OutputStore,
    job_timeout: Duration,
}

impl ConversionPipeline {
    pub fn new(config: &RiplineConfig) -> Result<Self, JobError> {
        Ok(Self::from_parts(
            Extractor::new(config.extractor.clone())?,
            OutputStore::new(&config.output_root, config.public_prefix.as_str()),
            config.job_timeout,
        ))
    }

    pub fn from_parts(extractor: Extractor, store: OutputStore, job_timeout: Duration) -> Self {
        Self {
            extractor,
            store,
            job_timeout,
        }
    }

    /// Run the job under one wall-clock limit. Any failure, panics
    /// included, removes the job's directory before it propagates.
    async fn execute(
        &self,
        job: &Job,
        reporter: &mut ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<Delivery, JobError> {
        reporter.report(ProgressUpdate::initializing());
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let limit = self.job_timeout;
        let staged = AssertUnwindSafe(tokio::time::timeout(
            limit,
            self.stages(job, reporter, &cancel),
        ))
        .catch_unwind()
        .await;

        let result = match staged {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(JobError::Timeout(limit)),
            Err(panic) => {
                self.discard(job).await;
                std::panic::resume_unwind(panic);
            }
        };
        if let Err(e) = &result {
            tracing::info!(job_id = %job.id, kind = ?e.kind(), "Removing output of failed job");
            self.discard(job).await;
        }
        result
    }

    async fn stages(
        &self,
        job: &Job,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Delivery, JobError> {
        self.extractor.probe().await?;

        let dir = self
            .store
            .create_job_dir(job.id)
            .await
            .map_err(|e| JobError::Internal(format!("creating output directory: {e}")))?;

        self.convert(job, &dir, reporter, cancel).await
    }

    async fn discard(&self, job: &Job) {
        if let Err(e) = self.store.remove_job_dir(job.id).await {
            tracing::warn!(job_id = %job.id, "Failed to remove job directory: {}", e);
        }
    }

    async fn convert(
        &self,
        job: &Job,
        dir: &Path,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Delivery, JobError> {
        let summary = self
            .extractor
            .run(&job.source_reference, dir, reporter, cancel, self.job_timeout)
            .await?;

        reporter.report(ProgressUpdate::packaging(summary.total_tracks));

        let package = storage::package(dir, &job.display_title)
            .await
            .map_err(|e| match e {
                StorageError::NoMediaFiles(_) => JobError::NoOutput,
                other => JobError::Packaging(other.to_string()),
            })?;

        Ok(Delivery {
            download_url: self.store.download_url(job.id, &package.filename),
            deliverable_path: package.path,
            filename: package.filename,
            total_files: package.file_count,
        })
    }
}

impl JobPipeline for ConversionPipeline {
    fn run<'a>(
        &'a self,
        job: &'a Job,
        reporter: &'a mut ProgressReporter,
        cancel: CancellationToken,
    ) -> PipelineFuture<'a> {
        Box::pin(self.execute(job, reporter, cancel))
    }
}
