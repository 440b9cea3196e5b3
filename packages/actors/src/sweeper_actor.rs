//! Sweeper actor for the periodic retention sweep.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use ractor::{Actor, ActorProcessingErr, ActorRef};
use storage::sweep_expired;

use crate::messages::SweeperMessage;

/// Sweeper actor arguments.
pub struct SweeperArgs {
    pub root: PathBuf,
    pub retention: Duration,
    pub interval: Duration,
}

/// State for the sweeper actor.
pub struct SweeperActorState {
    root: PathBuf,
    retention: Duration,
}

/// Sweeper actor that deletes aged output.
///
/// It works from modification times alone and knows nothing about jobs.
pub struct SweeperActor;

impl Actor for SweeperActor {
    type Msg = SweeperMessage;
    type State = SweeperActorState;
    type Arguments = SweeperArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            root = %args.root.display(),
            retention_secs = args.retention.as_secs(),
            interval_secs = args.interval.as_secs(),
            "Starting retention sweeper"
        );

        // Start periodic tick
        let period = args.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if myself.send_message(SweeperMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(SweeperActorState {
            root: args.root,
            retention: args.retention,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SweeperMessage::Tick => {
                match sweep_expired(&state.root, state.retention, SystemTime::now()).await {
                    Ok(report) if report.removed > 0 || report.failed > 0 => {
                        tracing::info!(
                            scanned = report.scanned,
                            removed = report.removed,
                            failed = report.failed,
                            "Retention sweep finished"
                        );
                    }
                    Ok(_) => tracing::debug!("Retention sweep: nothing expired"),
                    Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
                }
            }

            SweeperMessage::SweepNow { reply } => {
                let result = sweep_expired(&state.root, state.retention, SystemTime::now()).await;
                let _ = reply.send(result);
            }
        }

        Ok(())
    }
}
