//! Events pushed from the client core to whatever renders it.
//!
//! Every state change the UI cares about is broadcast as a [`ClientEvent`].
//! Failed external calls surface here as exactly one [`Notice`] of level
//! [`NoticeLevel::Error`].

use serde::Serialize;
use tokio::sync::broadcast;

use murmur_shared::types::{ChannelState, Message, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClientEvent {
    Notice(Notice),
    /// The session became identified (`Some`) or was cleared (`None`).
    SessionChanged { user: Option<UserId> },
    ChannelStateChanged { state: ChannelState },
    /// Full replacement of the online set.
    PresenceChanged { online: Vec<UserId> },
    RosterLoaded { peers: usize },
    HistoryLoaded { peer: UserId, messages: usize },
    /// A message was appended to the visible log.
    MessageAppended { message: Message },
    UnseenChanged { peer: UserId, count: u32 },
}

/// Fan-out of [`ClientEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn success(&self, text: impl Into<String>) {
        self.emit(ClientEvent::Notice(Notice {
            level: NoticeLevel::Success,
            text: text.into(),
        }));
    }

    pub fn error(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(notice = %text, "Error notice");
        self.emit(ClientEvent::Notice(Notice {
            level: NoticeLevel::Error,
            text,
        }));
    }
}
