//! Queue actor for admission and dispatch of conversion jobs.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use ripline_core::{Job, JobError, JobId, ProgressEvent, ProgressUpdate, QueueStats, SessionId};
use tokio_util::sync::CancellationToken;

use crate::channel::ProgressChannel;
use crate::messages::{JobOutcome, QueueMessage};
use crate::pipeline::JobPipeline;
use crate::reporter::ProgressReporter;

/// A job holding a worker slot.
struct ActiveJob {
    session_id: SessionId,
    cancel: CancellationToken,
}

/// Queue actor arguments.
pub struct QueueArgs {
    pub max_concurrent: usize,
    pub pipeline: Arc<dyn JobPipeline>,
    pub channel: Arc<dyn ProgressChannel>,
}

/// State for the queue actor.
///
/// Only the actor mutates this, one message at a time, so slot accounting
/// and dispatch decisions never race.
pub struct QueueActorState {
    max_concurrent: usize,
    /// Jobs waiting for a slot, oldest first.
    pending: VecDeque<Job>,
    /// Jobs holding a slot.
    active: HashMap<JobId, ActiveJob>,
    pipeline: Arc<dyn JobPipeline>,
    channel: Arc<dyn ProgressChannel>,
    completed: u64,
    failed: u64,
    /// Set once shutdown starts.
    closing: bool,
    /// Shutdown callers, answered when the last active job ends.
    shutdown_waiters: Vec<RpcReplyPort<()>>,
}

impl QueueActorState {
    pub fn new(args: QueueArgs) -> Self {
        Self {
            max_concurrent: args.max_concurrent.max(1),
            pending: VecDeque::new(),
            active: HashMap::new(),
            pipeline: args.pipeline,
            channel: args.channel,
            completed: 0,
            failed: 0,
            closing: false,
            shutdown_waiters: Vec::new(),
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.pending.len(),
            active: self.active.len(),
            max_concurrent: self.max_concurrent,
            completed: self.completed,
            failed: self.failed,
        }
    }

    /// Start queued jobs while slots are free.
    fn dispatch(&mut self, myself: &ActorRef<QueueMessage>) {
        if self.closing {
            return;
        }
        while self.active.len() < self.max_concurrent {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            self.start(job, myself);
        }
    }

    fn start(&mut self, job: Job, myself: &ActorRef<QueueMessage>) {
        let cancel = CancellationToken::new();
        self.active.insert(
            job.id,
            ActiveJob {
                session_id: job.session_id.clone(),
                cancel: cancel.clone(),
            },
        );

        tracing::info!(
            job_id = %job.id,
            session_id = %job.session_id,
            active = self.active.len(),
            queued = self.pending.len(),
            "Job started"
        );

        let pipeline = self.pipeline.clone();
        let channel = self.channel.clone();
        let queue = myself.clone();
        tokio::spawn(async move {
            let job_id = job.id;
            let outcome = run_job(pipeline, channel, job, cancel).await;
            if queue
                .send_message(QueueMessage::JobFinished { job_id, outcome })
                .is_err()
            {
                tracing::debug!(%job_id, "Queue stopped before job finished");
            }
        });
    }

    /// Stop once shutdown has started and no job holds a slot.
    fn finish_closing(&mut self, myself: &ActorRef<QueueMessage>) {
        if !self.closing || !self.active.is_empty() {
            return;
        }
        tracing::info!("Job queue drained");
        for reply in self.shutdown_waiters.drain(..) {
            let _ = reply.send(());
        }
        myself.stop(None);
    }

    /// Publish a `cancelled` terminal event for a job that never started.
    fn cancel_queued(&mut self, job: &Job) {
        let event = ProgressEvent::failed(
            job.id,
            &ProgressUpdate::initializing(),
            &JobError::Cancelled,
        );
        self.channel.publish(&job.session_id, event);
        self.failed += 1;
    }
}

/// Run one job's pipeline and publish its terminal event.
///
/// Panics inside the pipeline are caught here so the slot is always
/// released.
async fn run_job(
    pipeline: Arc<dyn JobPipeline>,
    channel: Arc<dyn ProgressChannel>,
    job: Job,
    cancel: CancellationToken,
) -> JobOutcome {
    let mut reporter = ProgressReporter::new(&job, channel);

    let result = AssertUnwindSafe(pipeline.run(&job, &mut reporter, cancel))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(delivery)) => {
            tracing::info!(job_id = %job.id, file = %delivery.filename, "Job completed");
            reporter.complete(delivery);
            JobOutcome::Completed
        }
        Ok(Err(error)) => {
            tracing::warn!(job_id = %job.id, kind = ?error.kind(), "Job failed: {}", error);
            reporter.fail(&error);
            JobOutcome::Failed
        }
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            tracing::error!(job_id = %job.id, "Job pipeline panicked: {}", detail);
            reporter.fail(&JobError::Internal(detail));
            JobOutcome::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "pipeline panicked".to_string()
    }
}

/// Queue actor that owns admission and slot accounting.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(max_concurrent = args.max_concurrent, "Starting job queue");
        Ok(QueueActorState::new(args))
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for active in state.active.values() {
            active.cancel.cancel();
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Submit { request, reply } => {
                let job = Job::new(request);
                let job_id = job.id;

                if state.closing {
                    state.cancel_queued(&job);
                    let _ = reply.send(job_id);
                    return Ok(());
                }

                if state.active.len() >= state.max_concurrent {
                    let ahead = state.pending.len();
                    state.channel.publish(
                        &job.session_id,
                        ProgressEvent::progress(job_id, ProgressUpdate::queued(ahead)),
                    );
                    tracing::info!(
                        %job_id,
                        session_id = %job.session_id,
                        ahead,
                        "Job queued"
                    );
                }

                state.pending.push_back(job);
                state.dispatch(&myself);
                let _ = reply.send(job_id);
            }

            QueueMessage::JobFinished { job_id, outcome } => {
                if state.active.remove(&job_id).is_some() {
                    match outcome {
                        JobOutcome::Completed => state.completed += 1,
                        JobOutcome::Failed => state.failed += 1,
                    }
                }
                state.dispatch(&myself);
                state.finish_closing(&myself);
            }

            QueueMessage::CancelSession { session_id, reply } => {
                let (dropped, kept): (Vec<Job>, Vec<Job>) = state
                    .pending
                    .drain(..)
                    .partition(|job| job.session_id == session_id);
                state.pending = kept.into();
                for job in &dropped {
                    state.cancel_queued(job);
                }

                let mut cancelled = dropped.len();
                for active in state.active.values() {
                    if active.session_id == session_id && !active.cancel.is_cancelled() {
                        active.cancel.cancel();
                        cancelled += 1;
                    }
                }

                if cancelled > 0 {
                    tracing::info!(session_id = %session_id, cancelled, "Cancelled session jobs");
                }
                let _ = reply.send(cancelled);
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Shutdown { reply } => {
                state.shutdown_waiters.push(reply);
                if state.closing {
                    return Ok(());
                }
                tracing::info!(
                    active = state.active.len(),
                    queued = state.pending.len(),
                    "Shutting down job queue"
                );
                let pending: Vec<Job> = state.pending.drain(..).collect();
                for job in &pending {
                    state.cancel_queued(job);
                }
                for active in state.active.values() {
                    active.cancel.cancel();
                }
                state.closing = true;
                state.finish_closing(&myself);
            }
        }

        Ok(())
    }
}
