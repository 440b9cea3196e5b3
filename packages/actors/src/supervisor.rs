//! Supervisor actor owning the queue, progress channel and sweeper.

use std::sync::Arc;

use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use ripline_core::RiplineConfig;

use crate::channel::{ChannelActor, ProgressChannel};
use crate::messages::{ChannelMessage, QueueMessage, SupervisorMessage, SystemRefs};
use crate::pipeline::JobPipeline;
use crate::queue_actor::{QueueActor, QueueArgs};
use crate::sweeper_actor::{SweeperActor, SweeperArgs};

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub config: RiplineConfig,
    pub pipeline: Arc<dyn JobPipeline>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    pub children: SystemRefs,
}

/// Supervisor actor that spawns and links the system's actors.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting conversion supervisor");

        let (channel, _) = Actor::spawn_linked(None, ChannelActor, (), myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn channel: {}", e)))?;

        let queue_args = QueueArgs {
            max_concurrent: args.config.max_concurrent,
            pipeline: args.pipeline,
            channel: Arc::new(channel.clone()) as Arc<dyn ProgressChannel>,
        };
        let (queue, _) = Actor::spawn_linked(None, QueueActor, queue_args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn queue: {}", e)))?;

        let sweeper_args = SweeperArgs {
            root: args.config.output_root.clone(),
            retention: args.config.retention,
            interval: args.config.sweep_interval,
        };
        let (sweeper, _) =
            Actor::spawn_linked(None, SweeperActor, sweeper_args, myself.get_cell())
                .await
                .map_err(|e| {
                    ActorProcessingErr::from(format!("Failed to spawn sweeper: {}", e))
                })?;

        Ok(SupervisorState {
            children: SystemRefs {
                queue,
                channel,
                sweeper,
            },
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::GetChildren { reply } => {
                let _ = reply.send(state.children.clone());
            }

            SupervisorMessage::Shutdown { reply } => {
                tracing::info!("Shutting down conversion supervisor");
                let children = &state.children;

                let (tx, rx) = ractor::concurrency::oneshot();
                if children
                    .queue
                    .send_message(QueueMessage::Shutdown { reply: tx.into() })
                    .is_ok()
                {
                    let _ = rx.await;
                }

                // Terminal events are in the channel's mailbox; let them out.
                let (tx, rx) = ractor::concurrency::oneshot();
                if children
                    .channel
                    .send_message(ChannelMessage::Flush { reply: tx.into() })
                    .is_ok()
                {
                    let _ = rx.await;
                }

                children.sweeper.stop(None);
                children.channel.stop(None);
                myself.stop(None);
                let _ = reply.send(());
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::info!(
                    "Child actor {} terminated: {:?}",
                    cell.get_id(),
                    reason
                );
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                tracing::error!("Child actor {} failed: {}", cell.get_id(), error);
            }
            _ => {}
        }
        Ok(())
    }
}
