//! Roster, selection, unseen counters and the visible message log.
//!
//! [`ConversationStore`] does no I/O. Callers fetch from the network and hand
//! results in; the store decides whether they still apply.

use std::collections::HashMap;

use tracing::debug;

use murmur_shared::types::{Message, Peer, UserId};

/// Result of handing a fetched history to [`ConversationStore::load_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// The history replaced the visible log, which now holds `messages`
    /// entries.
    Applied { messages: usize },
    /// The selection moved on while the fetch was in flight; nothing changed.
    Stale,
}

/// One roster row with its derived presence and unseen count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub peer: Peer,
    pub online: bool,
    pub unseen: u32,
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    roster: Vec<Peer>,
    unseen: HashMap<UserId, u32>,
    // Last presence snapshot, in server order.
    online: Vec<UserId>,
    selected: Option<UserId>,
    // Always the log of `selected`, or empty.
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace roster and unseen counters together, from one fetch.
    pub fn load_roster(&mut self, peers: Vec<Peer>, unseen: HashMap<UserId, u32>) {
        self.roster = peers;
        self.unseen = unseen.into_iter().filter(|(_, n)| *n > 0).collect();
    }

    /// Change the selection. Returns `false` if `peer` was already selected.
    ///
    /// A new selection starts with an empty log until its history is loaded.
    /// Unseen counters are left alone.
    pub fn select_peer(&mut self, peer: Option<UserId>) -> bool {
        if self.selected == peer {
            return false;
        }
        debug!(from = ?self.selected, to = ?peer, "Selection changed");
        self.selected = peer;
        self.messages.clear();
        true
    }

    /// Apply a history fetched for `peer`.
    ///
    /// Only lands if `peer` is still selected; in that case the log becomes
    /// the fetched history and the peer's unseen counter drops to zero.
    /// Entries appended while the fetch was in flight and missing from it
    /// are kept after the history.
    pub fn load_history(&mut self, peer: &UserId, messages: Vec<Message>) -> HistoryOutcome {
        if self.selected.as_ref() != Some(peer) {
            debug!(peer = %peer, selected = ?self.selected, "Discarding stale history");
            return HistoryOutcome::Stale;
        }
        let live = std::mem::replace(&mut self.messages, messages);
        for message in live {
            if !self.messages.iter().any(|m| m.id == message.id) {
                debug!(id = %message.id, "Keeping message that arrived during history fetch");
                self.messages.push(message);
            }
        }
        self.unseen.remove(peer);
        HistoryOutcome::Applied {
            messages: self.messages.len(),
        }
    }

    /// Append a message the session holder sent. Ignored unless its receiver
    /// is still the selected peer.
    pub fn append_outgoing(&mut self, message: Message) -> bool {
        if self.selected.as_ref() != Some(&message.receiver_id) {
            return false;
        }
        self.push(message)
    }

    /// Append a message received from the selected peer.
    pub fn append_incoming(&mut self, message: Message) -> bool {
        if self.selected.as_ref() != Some(&message.sender_id) {
            return false;
        }
        self.push(message)
    }

    fn push(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(id = %message.id, "Message already in log");
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Count one more unseen message from `peer`; returns the new count.
    pub fn bump_unseen(&mut self, peer: &UserId) -> u32 {
        let count = self.unseen.entry(peer.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Replace the online set, keeping the snapshot's order.
    pub fn set_online(&mut self, ids: impl IntoIterator<Item = UserId>) {
        self.online.clear();
        for id in ids {
            if !self.online.contains(&id) {
                self.online.push(id);
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster
            .iter()
            .map(|peer| RosterEntry {
                online: self.online.contains(&peer.id),
                unseen: self.unseen_for(&peer.id),
                peer: peer.clone(),
            })
            .collect()
    }

    pub fn selected(&self) -> Option<&UserId> {
        self.selected.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn unseen(&self) -> &HashMap<UserId, u32> {
        &self.unseen
    }

    pub fn unseen_for(&self, peer: &UserId) -> u32 {
        self.unseen.get(peer).copied().unwrap_or(0)
    }

    pub fn is_online(&self, peer: &UserId) -> bool {
        self.online.contains(peer)
    }

    /// Online ids in the order of the last snapshot.
    pub fn online(&self) -> &[UserId] {
        &self.online
    }
}
