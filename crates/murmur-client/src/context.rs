//! The client context.
//!
//! [`ChatClient`] owns the session, the realtime channel and the conversation
//! state, and is the only place where failures become user notices. Session
//! and channel transitions take `&mut self`; conversation operations take
//! `&self` so history loads for different selections can overlap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use murmur_net::{ApiClient, ChatApi, RealtimeTransport, WsTransport};
use murmur_shared::protocol::{Credentials, OutgoingMessage, ProfileUpdate};
use murmur_shared::types::{AuthMode, ChannelState, Message, Profile, UserId};
use murmur_store::{Database, TokenStore};

use crate::config::ClientConfig;
use crate::conversation::{ConversationStore, HistoryOutcome, RosterEntry};
use crate::delivery::{lock, DeliveryCoordinator, Inbound};
use crate::error::{AuthError, ClientError, NetworkError, SendError};
use crate::events::{ClientEvent, EventBus};
use crate::presence::{PresenceChannel, PresenceEvent};
use crate::session::{Session, SessionStore};

pub struct ChatClient {
    api: Arc<dyn ChatApi>,
    transport: Arc<dyn RealtimeTransport>,
    session: SessionStore,
    channel: PresenceChannel,
    conversation: Arc<Mutex<ConversationStore>>,
    delivery: DeliveryCoordinator,
    events: EventBus,
    // Identity the conversation state belongs to.
    bound_user: Option<UserId>,
}

impl ChatClient {
    pub fn new(
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn RealtimeTransport>,
        tokens: Box<dyn TokenStore>,
        event_buffer: usize,
    ) -> Self {
        let events = EventBus::new(event_buffer);
        let conversation = Arc::new(Mutex::new(ConversationStore::new()));
        let delivery =
            DeliveryCoordinator::new(Arc::clone(&api), Arc::clone(&conversation), events.clone());

        Self {
            session: SessionStore::new(Arc::clone(&api), tokens),
            api,
            transport,
            channel: PresenceChannel::new(),
            conversation,
            delivery,
            events,
            bound_user: None,
        }
    }

    /// Wire up the HTTP client, the WebSocket transport and the on-disk token
    /// store described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config.server_url, config.request_timeout)?;
        let transport =
            WsTransport::new(config.server_url.clone()).with_buffer(config.event_buffer);
        let db = match &config.data_dir {
            Some(dir) => Database::open_in(dir)?,
            None => Database::new()?,
        };

        Ok(Self::new(
            Arc::new(api),
            Arc::new(transport),
            Box::new(db),
            config.event_buffer,
        ))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Restore a persisted session, verify it, and connect if it is valid.
    ///
    /// Returns the identified user, if any.
    pub async fn start(&mut self) -> Option<Profile> {
        let restored = match self.session.restore() {
            Ok(session) => session.is_some(),
            Err(e) => {
                error!(error = %e, "Failed to read saved session");
                self.events.error(format!("Failed to read saved session: {e}"));
                false
            }
        };
        if restored {
            if let Err(e) = self.session.check().await {
                warn!(error = %e, "Saved session could not be verified");
            }
        }

        self.on_session_changed().await;
        self.session.user().cloned()
    }

    /// Log in or register, then reconnect for the new identity.
    pub async fn login(
        &mut self,
        mode: AuthMode,
        credentials: &Credentials,
    ) -> Result<Profile, AuthError> {
        match self.session.establish(mode, credentials).await {
            Ok((user, message)) => {
                let fallback = match mode {
                    AuthMode::Login => "Login successful",
                    AuthMode::Register => "Account created successfully",
                };
                self.events
                    .success(message.unwrap_or_else(|| fallback.to_string()));
                self.on_session_changed().await;
                Ok(user)
            }
            Err(e) => {
                self.events.error(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn logout(&mut self) {
        if let Some(old) = self.session.clear() {
            info!(user = ?old.user_id(), "Logged out");
        }
        self.on_session_changed().await;
        self.events.success("Logged out successfully");
    }

    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<Profile, AuthError> {
        match self.session.update_profile(update).await {
            Ok(user) => {
                let user = user.clone();
                self.events.success("Profile updated successfully");
                Ok(user)
            }
            Err(e) => {
                self.events.error(e.to_string());
                Err(e)
            }
        }
    }

    /// Re-derive the channel and roster from the current session.
    ///
    /// Any open channel is torn down first. If the session is identified a
    /// new channel is opened for it and the roster is fetched; conversation
    /// state from a different identity is dropped.
    pub async fn on_session_changed(&mut self) {
        let user = self.session.user_id().cloned();

        if self.bound_user != user {
            lock(&self.conversation).clear();
            self.bound_user = user.clone();
        }
        self.events
            .emit(ClientEvent::SessionChanged { user: user.clone() });

        let events = self.events.clone();
        let Some(user) = user else {
            if self.channel.close().await {
                events.emit(ClientEvent::ChannelStateChanged {
                    state: ChannelState::Closed,
                });
            }
            return;
        };

        let opened = self
            .channel
            .open(self.transport.as_ref(), &user, |state| {
                events.emit(ClientEvent::ChannelStateChanged { state })
            })
            .await;
        if let Err(e) = opened {
            self.events.error(e.to_string());
        }

        // failure already surfaced as a notice
        let _ = self.refresh_roster().await;
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Fetch the roster and unseen counters and apply them together.
    pub async fn refresh_roster(&self) -> Result<usize, NetworkError> {
        let roster = match self.api.list_users().await {
            Ok(roster) => roster,
            Err(e) => return Err(self.network_failure(e)),
        };

        let peers = roster.peers.len();
        lock(&self.conversation).load_roster(roster.peers, roster.unseen);
        debug!(peers, "Roster loaded");
        self.events.emit(ClientEvent::RosterLoaded { peers });
        Ok(peers)
    }

    /// Change the selected peer. Returns whether the selection changed.
    pub fn select_peer(&self, peer: Option<UserId>) -> bool {
        lock(&self.conversation).select_peer(peer)
    }

    /// Fetch the history with `peer` and apply it if `peer` is still
    /// selected when it arrives.
    pub async fn load_history(&self, peer: &UserId) -> Result<HistoryOutcome, NetworkError> {
        let messages = match self.api.fetch_history(peer).await {
            Ok(messages) => messages,
            Err(e) => return Err(self.network_failure(e)),
        };

        let outcome = lock(&self.conversation).load_history(peer, messages);
        if let HistoryOutcome::Applied { messages } = outcome {
            self.events.emit(ClientEvent::HistoryLoaded {
                peer: peer.clone(),
                messages,
            });
            self.events.emit(ClientEvent::UnseenChanged {
                peer: peer.clone(),
                count: 0,
            });
        }
        Ok(outcome)
    }

    /// Select `peer` and load its history.
    pub async fn open_conversation(&self, peer: UserId) -> Result<HistoryOutcome, NetworkError> {
        self.select_peer(Some(peer.clone()));
        self.load_history(&peer).await
    }

    /// Send to the selected peer.
    pub async fn send_message(
        &self,
        peer: &UserId,
        outgoing: &OutgoingMessage,
    ) -> Result<Message, SendError> {
        self.delivery.send(peer, outgoing).await.map_err(|e| {
            self.events.error(e.to_string());
            e
        })
    }

    // -----------------------------------------------------------------------
    // Realtime
    // -----------------------------------------------------------------------

    /// Wait for the next realtime event and apply it.
    ///
    /// Returns `None` when no channel is open. Cancel safe, so it can sit in
    /// a `select!` next to user input.
    pub async fn next_event(&mut self) -> Option<Inbound> {
        let event = self.channel.recv().await?;
        Some(self.dispatch(event))
    }

    /// Close the realtime channel, keeping the session for the next start.
    pub async fn shutdown(&mut self) {
        if self.channel.close().await {
            self.events.emit(ClientEvent::ChannelStateChanged {
                state: ChannelState::Closed,
            });
        }
    }

    fn dispatch(&self, event: PresenceEvent) -> Inbound {
        match event {
            PresenceEvent::Snapshot(online) => self.delivery.on_presence_snapshot(online),
            PresenceEvent::Message(message) => self.delivery.on_inbound_message(message),
            PresenceEvent::Closed { reason } => {
                self.events.emit(ClientEvent::ChannelStateChanged {
                    state: ChannelState::Closed,
                });
                Inbound::ChannelClosed { reason }
            }
        }
    }

    fn network_failure(&self, e: murmur_net::ApiError) -> NetworkError {
        let e = NetworkError::from(e);
        self.events.error(e.message());
        e
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn session(&self) -> Option<&Session> {
        self.session.session()
    }

    pub fn user(&self) -> Option<&Profile> {
        self.session.user()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn channel_generation(&self) -> u64 {
        self.channel.generation()
    }

    /// Run `f` against the conversation state.
    pub fn with_conversation<R>(&self, f: impl FnOnce(&ConversationStore) -> R) -> R {
        f(&lock(&self.conversation))
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.with_conversation(ConversationStore::roster)
    }

    pub fn selected(&self) -> Option<UserId> {
        self.with_conversation(|c| c.selected().cloned())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.with_conversation(|c| c.messages().to_vec())
    }

    pub fn unseen(&self) -> HashMap<UserId, u32> {
        self.with_conversation(|c| c.unseen().clone())
    }

    pub fn unseen_for(&self, peer: &UserId) -> u32 {
        self.with_conversation(|c| c.unseen_for(peer))
    }

    /// Online peers in the order the server listed them.
    pub fn online(&self) -> Vec<UserId> {
        self.with_conversation(|c| c.online().to_vec())
    }
}
