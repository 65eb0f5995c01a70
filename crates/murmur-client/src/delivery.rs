//! Routes outbound sends and inbound realtime events into the conversation
//! state.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use murmur_net::ChatApi;
use murmur_shared::protocol::OutgoingMessage;
use murmur_shared::types::{Message, UserId};

use crate::conversation::ConversationStore;
use crate::error::SendError;
use crate::events::{ClientEvent, EventBus};

/// What happened to one inbound realtime event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Appended to the open conversation and marked seen.
    Displayed(Message),
    /// Counted as unseen for a peer that is not selected.
    Counted { peer: UserId, count: u32 },
    /// Already present in the open conversation.
    Duplicate(Message),
    Presence(Vec<UserId>),
    /// The channel dropped.
    ChannelClosed { reason: Option<String> },
}

pub(crate) fn lock(store: &Mutex<ConversationStore>) -> MutexGuard<'_, ConversationStore> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct DeliveryCoordinator {
    api: Arc<dyn ChatApi>,
    store: Arc<Mutex<ConversationStore>>,
    events: EventBus,
}

impl DeliveryCoordinator {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Arc<Mutex<ConversationStore>>,
        events: EventBus,
    ) -> Self {
        Self { api, store, events }
    }

    /// Deliver `outgoing` to `peer`, which must be the selected peer.
    ///
    /// The message is appended only after the server confirms it; a failed
    /// send leaves the log untouched.
    pub async fn send(
        &self,
        peer: &UserId,
        outgoing: &OutgoingMessage,
    ) -> Result<Message, SendError> {
        let selected = lock(&self.store).selected().cloned();
        if selected.as_ref() != Some(peer) {
            debug_assert!(
                false,
                "send to {peer} with no matching selection (selected: {selected:?})"
            );
            return Err(SendError::NotSelected {
                requested: peer.clone(),
                selected,
            });
        }
        if outgoing.is_empty() {
            return Err(SendError::Empty);
        }

        let message = self.api.send_message(peer, outgoing).await?;
        debug!(id = %message.id, peer = %peer, "Message sent");

        let appended = lock(&self.store).append_outgoing(message.clone());
        if appended {
            self.events.emit(ClientEvent::MessageAppended {
                message: message.clone(),
            });
        } else {
            debug!(id = %message.id, "Selection moved on; sent message not shown");
        }
        Ok(message)
    }

    /// Handle a message pushed over the realtime channel.
    ///
    /// From the selected peer it is shown immediately as seen and the server
    /// is told in the background; from anyone else it bumps that peer's
    /// unseen counter.
    pub fn on_inbound_message(&self, mut message: Message) -> Inbound {
        let mut store = lock(&self.store);

        if store.selected() != Some(&message.sender_id) {
            let count = store.bump_unseen(&message.sender_id);
            drop(store);
            debug!(from = %message.sender_id, count, "Unseen message");
            let peer = message.sender_id;
            self.events.emit(ClientEvent::UnseenChanged {
                peer: peer.clone(),
                count,
            });
            return Inbound::Counted { peer, count };
        }

        message.seen = true;
        let appended = store.append_incoming(message.clone());
        drop(store);

        if !appended {
            return Inbound::Duplicate(message);
        }

        self.mark_seen_in_background(&message);
        self.events.emit(ClientEvent::MessageAppended {
            message: message.clone(),
        });
        Inbound::Displayed(message)
    }

    /// Replace the online set with a server snapshot.
    pub fn on_presence_snapshot(&self, online: Vec<UserId>) -> Inbound {
        debug!(count = online.len(), "Presence snapshot");
        lock(&self.store).set_online(online.iter().cloned());
        self.events.emit(ClientEvent::PresenceChanged {
            online: online.clone(),
        });
        Inbound::Presence(online)
    }

    fn mark_seen_in_background(&self, message: &Message) {
        let api = Arc::clone(&self.api);
        let id = message.id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.mark_seen(&id).await {
                warn!(id = %id, error = %e, "Failed to mark message seen");
            }
        });
    }
}
