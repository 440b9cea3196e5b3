//! Message types for actor communication.

use ractor::{ActorRef, RpcReplyPort};
use ripline_core::{ConfigError, JobError, JobId, JobRequest, ProgressEvent, QueueStats, SessionId};
use storage::{StorageError, SweepReport};
use tokio::sync::mpsc;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Admit a new job; replies with its id as soon as it is queued.
    Submit {
        request: JobRequest,
        reply: RpcReplyPort<JobId>,
    },

    /// A job's pipeline ended and its terminal event has been published.
    JobFinished { job_id: JobId, outcome: JobOutcome },

    /// Drop queued jobs of a session and cancel its active ones.
    /// Replies with the number of jobs affected.
    CancelSession {
        session_id: SessionId,
        reply: RpcReplyPort<usize>,
    },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Stop admitting jobs, cancel queued and active ones, and stop once
    /// every active job has published its terminal event.
    Shutdown { reply: RpcReplyPort<()> },
}

/// How a job's pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

/// Messages for the ChannelActor.
#[derive(Debug)]
pub enum ChannelMessage {
    /// Deliver an event to every subscriber of a session.
    Publish {
        session_id: SessionId,
        event: Box<ProgressEvent>,
    },

    /// Attach a subscriber to a session. Replies once it is registered.
    Subscribe {
        session_id: SessionId,
        sender: mpsc::UnboundedSender<ProgressEvent>,
        reply: RpcReplyPort<()>,
    },

    /// Count live subscribers of a session.
    SubscriberCount {
        session_id: SessionId,
        reply: RpcReplyPort<usize>,
    },

    /// Replies once every earlier message has been handled.
    Flush { reply: RpcReplyPort<()> },
}

/// Messages for the SweeperActor.
#[derive(Debug)]
pub enum SweeperMessage {
    /// Periodic sweep.
    Tick,

    /// Sweep right now and report the result.
    SweepNow {
        reply: RpcReplyPort<Result<SweepReport, StorageError>>,
    },
}

/// References to the supervised actors.
#[derive(Debug, Clone)]
pub struct SystemRefs {
    pub queue: ActorRef<QueueMessage>,
    pub channel: ActorRef<ChannelMessage>,
    pub sweeper: ActorRef<SweeperMessage>,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Get the supervised actors.
    GetChildren { reply: RpcReplyPort<SystemRefs> },

    /// Drain the queue, flush the channel, then stop everything.
    Shutdown { reply: RpcReplyPort<()> },
}

/// Error type for actor-system operations.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline setup failed: {0}")]
    Pipeline(#[from] JobError),

    #[error("failed to spawn actor: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("actor unavailable: {0}")]
    Messaging(String),

    #[error("actor stopped before replying")]
    NoReply,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
