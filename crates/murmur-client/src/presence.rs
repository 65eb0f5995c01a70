//! Realtime channel lifecycle for the current session.
//!
//! `Closed → Connecting → Open → Closed`. At most one channel exists at a
//! time: [`PresenceChannel::open`] always tears the previous one down before
//! connecting, and once torn down nothing from that channel is ever yielded
//! again.

use tracing::{debug, info, warn};

use murmur_net::{ChannelHandle, ChannelNotification, RealtimeTransport};
use murmur_shared::protocol::ServerEvent;
use murmur_shared::types::{ChannelState, Message, UserId};

use crate::error::ChannelError;

/// What the open channel delivered, in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Full list of online user ids.
    Snapshot(Vec<UserId>),
    Message(Message),
    /// The transport dropped; the channel is now `Closed`.
    Closed { reason: Option<String> },
}

struct Live {
    handle: ChannelHandle,
    user: UserId,
}

pub struct PresenceChannel {
    state: ChannelState,
    generation: u64,
    live: Option<Live>,
}

impl Default for PresenceChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceChannel {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Closed,
            generation: 0,
            live: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Incremented every time a channel is opened.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Identity the open channel is bound to.
    pub fn user(&self) -> Option<&UserId> {
        self.live.as_ref().map(|l| &l.user)
    }

    /// Open a channel bound to `user_id`, replacing any existing one.
    ///
    /// `on_state` observes each transition.
    pub async fn open(
        &mut self,
        transport: &dyn RealtimeTransport,
        user_id: &UserId,
        mut on_state: impl FnMut(ChannelState),
    ) -> Result<(), ChannelError> {
        if self.close().await {
            on_state(ChannelState::Closed);
        }

        self.generation += 1;
        self.state = ChannelState::Connecting;
        on_state(self.state);
        debug!(user = %user_id, generation = self.generation, "Opening realtime channel");

        match transport.connect(user_id).await {
            Ok(handle) => {
                self.live = Some(Live {
                    handle,
                    user: user_id.clone(),
                });
                self.state = ChannelState::Open;
                on_state(self.state);
                info!(user = %user_id, generation = self.generation, "Realtime channel open");
                Ok(())
            }
            Err(e) => {
                self.state = ChannelState::Closed;
                on_state(self.state);
                warn!(user = %user_id, error = %e, "Realtime channel failed to open");
                Err(e)
            }
        }
    }

    /// Tear the channel down. Returns whether there was anything to close;
    /// a second call is a no-op.
    pub async fn close(&mut self) -> bool {
        self.state = ChannelState::Closed;
        let Some(live) = self.live.take() else {
            return false;
        };
        live.handle.shutdown().await;
        debug!(user = %live.user, generation = self.generation, "Realtime channel closed");
        true
    }

    /// Next event from the open channel.
    ///
    /// Returns `None` when no channel is open. Cancel safe.
    pub async fn recv(&mut self) -> Option<PresenceEvent> {
        let live = self.live.as_mut()?;
        match live.handle.recv().await {
            Some(ChannelNotification::Event(ServerEvent::OnlineUsers(ids))) => {
                Some(PresenceEvent::Snapshot(ids))
            }
            Some(ChannelNotification::Event(ServerEvent::NewMessage(message))) => {
                Some(PresenceEvent::Message(message))
            }
            Some(ChannelNotification::Closed { reason }) => Some(self.dropped(reason)),
            None => Some(self.dropped(None)),
        }
    }

    fn dropped(&mut self, reason: Option<String>) -> PresenceEvent {
        if let Some(live) = self.live.take() {
            warn!(user = %live.user, reason = ?reason, "Realtime channel dropped");
        }
        self.state = ChannelState::Closed;
        PresenceEvent::Closed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{msg, FakeTransport};

    #[tokio::test]
    async fn test_open_walks_through_states() {
        let transport = FakeTransport::new();
        let mut channel = PresenceChannel::new();
        let mut seen = Vec::new();

        channel
            .open(&transport, &UserId::from("u1"), |s| seen.push(s))
            .await
            .unwrap();

        assert_eq!(seen, [ChannelState::Connecting, ChannelState::Open]);
        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(channel.user().map(UserId::as_str), Some("u1"));
        assert_eq!(transport.connects(), vec![UserId::from("u1")]);
    }

    #[tokio::test]
    async fn test_failed_open_ends_closed() {
        let transport = FakeTransport::new();
        transport.fail_next_connect();
        let mut channel = PresenceChannel::new();

        let err = channel.open(&transport, &UserId::from("u1"), |_| {}).await;
        assert!(matches!(err, Err(ChannelError::Connect(_))));
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_events_are_yielded_in_order() {
        let transport = FakeTransport::new();
        let mut channel = PresenceChannel::new();
        channel.open(&transport, &UserId::from("u1"), |_| {}).await.unwrap();

        transport.push(ServerEvent::OnlineUsers(vec![UserId::from("u2")]));
        transport.push(ServerEvent::NewMessage(msg("m1", "u2", "u1")));

        assert_eq!(
            channel.recv().await,
            Some(PresenceEvent::Snapshot(vec![UserId::from("u2")]))
        );
        assert!(matches!(channel.recv().await, Some(PresenceEvent::Message(m)) if m.id.as_str() == "m1"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = FakeTransport::new();
        let mut channel = PresenceChannel::new();
        channel.open(&transport, &UserId::from("u1"), |_| {}).await.unwrap();

        assert!(channel.close().await);
        assert!(!channel.close().await);
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(transport.teardowns(), 1);
    }

    #[tokio::test]
    async fn test_reopen_tears_down_previous_channel_first() {
        let transport = FakeTransport::new();
        let mut channel = PresenceChannel::new();
        channel.open(&transport, &UserId::from("u1"), |_| {}).await.unwrap();
        let first = transport.latest_sender().unwrap();

        let mut seen = Vec::new();
        channel
            .open(&transport, &UserId::from("u9"), |s| seen.push(s))
            .await
            .unwrap();

        assert_eq!(
            seen,
            [ChannelState::Closed, ChannelState::Connecting, ChannelState::Open]
        );
        assert_eq!(transport.teardowns(), 1);
        assert_eq!(channel.generation(), 2);
        // the old channel's queue is gone, so stragglers cannot be delivered
        assert!(first.is_closed());
        assert_eq!(channel.user().map(UserId::as_str), Some("u9"));
    }

    #[tokio::test]
    async fn test_remote_drop_closes_channel() {
        let transport = FakeTransport::new();
        let mut channel = PresenceChannel::new();
        channel.open(&transport, &UserId::from("u1"), |_| {}).await.unwrap();

        transport.drop_connection(Some("server restart"));

        assert_eq!(
            channel.recv().await,
            Some(PresenceEvent::Closed {
                reason: Some("server restart".into())
            })
        );
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.recv().await.is_none());
        // nothing left to tear down
        assert!(!channel.close().await);
    }
}
