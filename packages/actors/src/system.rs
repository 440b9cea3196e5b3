//! Public handle over the running actor system.

use std::sync::Arc;

use ractor::{Actor, ActorRef, RpcReplyPort};
use ripline_core::{JobId, JobRequest, ProgressEvent, QueueStats, RiplineConfig, SessionId};
use storage::SweepReport;
use tokio::sync::mpsc;

use crate::messages::{
    ChannelMessage, QueueMessage, SupervisorMessage, SweeperMessage, SystemError, SystemRefs,
};
use crate::pipeline::{ConversionPipeline, JobPipeline};
use crate::supervisor::{Supervisor, SupervisorArgs};

/// Send a request to an actor and wait for its reply.
async fn ask<M, T>(
    actor: &ActorRef<M>,
    build: impl FnOnce(RpcReplyPort<T>) -> M,
) -> Result<T, SystemError>
where
    M: ractor::Message,
    T: Send + 'static,
{
    let (tx, rx) = ractor::concurrency::oneshot();
    actor
        .send_message(build(tx.into()))
        .map_err(|e| SystemError::Messaging(e.to_string()))?;
    rx.await.map_err(|_| SystemError::NoReply)
}

/// Handle to a running conversion system.
///
/// Cheap to clone; every clone talks to the same actors.
#[derive(Clone)]
pub struct Ripline {
    supervisor: ActorRef<SupervisorMessage>,
    children: SystemRefs,
}

impl Ripline {
    /// Attach a subscriber to a session's progress events.
    ///
    /// Events published before this returns are not replayed. Dropping the
    /// receiver detaches it.
    pub async fn subscribe(
        &self,
        session_id: &SessionId,
    ) -> Result<mpsc::UnboundedReceiver<ProgressEvent>, SystemError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        ask(&self.children.channel, |reply| ChannelMessage::Subscribe {
            session_id: session_id.clone(),
            sender,
            reply,
        })
        .await?;
        Ok(receiver)
    }

    /// Live subscribers of a session.
    pub async fn subscriber_count(&self, session_id: &SessionId) -> Result<usize, SystemError> {
        ask(&self.children.channel, |reply| ChannelMessage::SubscriberCount {
            session_id: session_id.clone(),
            reply,
        })
        .await
    }

    /// Queue a job. Returns once it is admitted; everything after that
    /// arrives on the session's progress channel.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, SystemError> {
        ask(&self.children.queue, |reply| QueueMessage::Submit { request, reply }).await
    }

    /// Cancel every queued and active job of a session.
    pub async fn cancel_session(&self, session_id: &SessionId) -> Result<usize, SystemError> {
        ask(&self.children.queue, |reply| QueueMessage::CancelSession {
            session_id: session_id.clone(),
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> Result<QueueStats, SystemError> {
        ask(&self.children.queue, |reply| QueueMessage::GetStats { reply }).await
    }

    /// Run a retention sweep now instead of waiting for the next tick.
    pub async fn sweep_now(&self) -> Result<SweepReport, SystemError> {
        Ok(ask(&self.children.sweeper, |reply| SweeperMessage::SweepNow { reply }).await??)
    }

    /// Cancel outstanding jobs, deliver their terminal events and stop.
    ///
    /// Calling it again, or from several handles at once, is fine.
    pub async fn shutdown(&self) -> Result<(), SystemError> {
        match ask(&self.supervisor, |reply| SupervisorMessage::Shutdown { reply }).await {
            // The supervisor answers every shutdown it handles; no answer
            // means an earlier one already stopped it.
            Err(SystemError::NoReply | SystemError::Messaging(_)) => Ok(()),
            other => other,
        }
    }
}

/// Start the actor system around `pipeline`.
pub async fn start_system(
    config: RiplineConfig,
    pipeline: Arc<dyn JobPipeline>,
) -> Result<(Ripline, tokio::task::JoinHandle<()>), SystemError> {
    config.validate()?;

    let (supervisor, handle) =
        Actor::spawn(None, Supervisor, SupervisorArgs { config, pipeline }).await?;

    let children = ask(&supervisor, |reply| SupervisorMessage::GetChildren { reply }).await?;

    Ok((
        Ripline {
            supervisor,
            children,
        },
        handle,
    ))
}

/// Start the actor system with the extraction utility pipeline.
pub async fn start_conversion_system(
    config: RiplineConfig,
) -> Result<(Ripline, tokio::task::JoinHandle<()>), SystemError> {
    let pipeline = ConversionPipeline::new(&config)?;
    start_system(config, Arc::new(pipeline)).await
}
