//! Per-session progress delivery.
//!
//! Delivery is lossy and at-most-once: an event published while a session
//! has no subscriber is dropped, and nothing is buffered for replay. A
//! client that loses its stream is expected to re-submit.

use std::collections::HashMap;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use ripline_core::{ProgressEvent, SessionId};
use tokio::sync::mpsc;

use crate::messages::ChannelMessage;

/// Where job progress is published.
///
/// A durable variant (for example an append-only per-session log) can sit
/// behind the same trait.
pub trait ProgressChannel: Send + Sync + 'static {
    fn publish(&self, session_id: &SessionId, event: ProgressEvent);
}

impl ProgressChannel for ActorRef<ChannelMessage> {
    fn publish(&self, session_id: &SessionId, event: ProgressEvent) {
        if let Err(e) = self.send_message(ChannelMessage::Publish {
            session_id: session_id.clone(),
            event: Box::new(event),
        }) {
            tracing::warn!(session_id = %session_id, "Progress channel unavailable: {}", e);
        }
    }
}

/// State for the channel actor.
#[derive(Default)]
pub struct ChannelActorState {
    subscribers: HashMap<SessionId, Vec<mpsc::UnboundedSender<ProgressEvent>>>,
}

impl ChannelActorState {
    fn publish(&mut self, session_id: &SessionId, event: ProgressEvent) {
        let Some(senders) = self.subscribers.get_mut(session_id) else {
            tracing::debug!(
                session_id = %session_id,
                stage = %event.stage,
                "No subscriber, event dropped"
            );
            return;
        };

        senders.retain(|tx| tx.send(event.clone()).is_ok());
        if senders.is_empty() {
            self.subscribers.remove(session_id);
        }
    }

    fn subscribe(&mut self, session_id: SessionId, sender: mpsc::UnboundedSender<ProgressEvent>) {
        let senders = self.subscribers.entry(session_id).or_default();
        senders.retain(|tx| !tx.is_closed());
        senders.push(sender);
    }

    fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.subscribers
            .get(session_id)
            .map_or(0, |s| s.iter().filter(|tx| !tx.is_closed()).count())
    }
}

/// Channel actor that fans events out to session subscribers.
///
/// A single mailbox keeps events from one job in emission order.
pub struct ChannelActor;

impl Actor for ChannelActor {
    type Msg = ChannelMessage;
    type State = ChannelActorState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting progress channel");
        Ok(ChannelActorState::default())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ChannelMessage::Publish { session_id, event } => {
                state.publish(&session_id, *event);
            }

            ChannelMessage::Subscribe {
                session_id,
                sender,
                reply,
            } => {
                tracing::debug!(session_id = %session_id, "Subscriber attached");
                state.subscribe(session_id, sender);
                let _ = reply.send(());
            }

            ChannelMessage::SubscriberCount { session_id, reply } => {
                let _ = reply.send(state.subscriber_count(&session_id));
            }

            ChannelMessage::Flush { reply } => {
                let _ = reply.send(());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use ripline_core::{JobId, ProgressUpdate};

    use super::*;

    fn event() -> ProgressEvent {
        ProgressEvent::progress(JobId::new(), ProgressUpdate::initializing())
    }

    #[test]
    fn events_reach_only_their_session() {
        let mut state = ChannelActorState::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.subscribe(SessionId::new("a"), tx_a);
        state.subscribe(SessionId::new("b"), tx_b);

        state.publish(&SessionId::new("a"), event());

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let mut state = ChannelActorState::default();
        let session = SessionId::new("s");
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribe(session.clone(), tx);
        assert_eq!(state.subscriber_count(&session), 1);

        drop(rx);
        assert_eq!(state.subscriber_count(&session), 0);
        state.publish(&session, event());
        assert!(!state.subscribers.contains_key(&session));
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let mut state = ChannelActorState::default();
        state.publish(&SessionId::new("nobody"), event());
        assert!(state.subscribers.is_empty());
    }
}
