//! In-memory stand-ins for the REST API and the realtime transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, Notify};

use murmur_net::{
    ApiError, AuthApi, ChannelError, ChannelHandle, ChannelNotification, MessagingApi,
    RealtimeTransport,
};
use murmur_shared::protocol::{
    AuthGrant, Credentials, OutgoingMessage, ProfileUpdate, Roster, ServerEvent,
};
use murmur_shared::types::{AuthMode, Message, MessageId, Peer, Profile, UserId};

pub fn peer(id: &str, name: &str) -> Peer {
    Profile {
        id: UserId::from(id),
        email: format!("{id}@x.io"),
        full_name: name.to_string(),
        profile_pic: None,
        bio: None,
    }
}

pub fn msg(id: &str, from: &str, to: &str) -> Message {
    Message {
        id: MessageId::new(id),
        sender_id: UserId::from(from),
        receiver_id: UserId::from(to),
        text: Some(format!("text of {id}")),
        image: None,
        seen: false,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

// ---------------------------------------------------------------------------
// FakeApi
// ---------------------------------------------------------------------------

struct ApiState {
    token: Option<String>,
    me: Profile,
    roster: Roster,
    history: HashMap<UserId, Vec<Message>>,
    gates: HashMap<UserId, Arc<Notify>>,
    roster_failure: bool,
    send_failure: Option<String>,
    mark_failure: bool,
    sent: Vec<(UserId, OutgoingMessage)>,
    marked: Vec<String>,
    history_calls: Vec<UserId>,
}

/// Accepts password `pw`; `T1` identifies `u1`, `T2` identifies `u9`.
pub struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    pub fn new() -> Self {
        let mut me = peer("u1", "Me");
        me.email = "me@x.io".into();
        Self {
            state: Mutex::new(ApiState {
                token: None,
                me,
                roster: Roster {
                    peers: vec![peer("u2", "Bea"), peer("u3", "Cy"), peer("u4", "Dee")],
                    unseen: HashMap::from([(UserId::from("u3"), 4)]),
                },
                history: HashMap::new(),
                gates: HashMap::new(),
                roster_failure: false,
                send_failure: None,
                mark_failure: false,
                sent: Vec::new(),
                marked: Vec::new(),
                history_calls: Vec::new(),
            }),
        }
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.state).token.clone()
    }

    pub fn set_history(&self, peer: &str, messages: Vec<Message>) {
        lock(&self.state).history.insert(UserId::from(peer), messages);
    }

    /// Make history fetches for `peer` wait until the returned gate is
    /// notified.
    pub fn hold_history(&self, peer: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.state)
            .gates
            .insert(UserId::from(peer), gate.clone());
        gate
    }

    pub fn fail_roster(&self) {
        lock(&self.state).roster_failure = true;
    }

    pub fn fail_sends(&self, message: &str) {
        lock(&self.state).send_failure = Some(message.to_string());
    }

    pub fn fail_marks(&self) {
        lock(&self.state).mark_failure = true;
    }

    pub fn sent(&self) -> Vec<(UserId, OutgoingMessage)> {
        lock(&self.state).sent.clone()
    }

    pub fn marked(&self) -> Vec<String> {
        lock(&self.state).marked.clone()
    }

    pub fn history_calls(&self) -> Vec<UserId> {
        lock(&self.state).history_calls.clone()
    }

    /// Wait for background mark-seen calls to land.
    pub async fn wait_for_marks(&self, count: usize) {
        for _ in 0..200 {
            if self.marked().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} mark-seen calls, got {:?}", self.marked());
    }

    fn require_token(&self) -> Result<(), ApiError> {
        match lock(&self.state).token.as_deref() {
            Some("T1") | Some("T2") => Ok(()),
            _ => Err(ApiError::Status {
                status: 401,
                message: "Not authorized".into(),
            }),
        }
    }
}

#[async_trait]
impl AuthApi for FakeApi {
    fn set_token(&self, token: Option<&str>) {
        lock(&self.state).token = token.map(str::to_string);
    }

    async fn authenticate(
        &self,
        mode: AuthMode,
        credentials: &Credentials,
    ) -> Result<AuthGrant, ApiError> {
        let state = lock(&self.state);
        match mode {
            AuthMode::Login if credentials.password == "pw" => Ok(AuthGrant {
                token: "T1".into(),
                user: state.me.clone(),
                message: Some("Login successful".into()),
            }),
            AuthMode::Login => Err(ApiError::Rejected("Invalid credentials".into())),
            AuthMode::Register if credentials.email == state.me.email => {
                Err(ApiError::Rejected("Account already exists".into()))
            }
            AuthMode::Register => {
                let mut user = peer("u9", credentials.full_name.as_deref().unwrap_or_default());
                user.email = credentials.email.clone();
                user.bio = credentials.bio.clone();
                Ok(AuthGrant {
                    token: "T2".into(),
                    user,
                    message: Some("Account created successfully".into()),
                })
            }
        }
    }

    async fn check_auth(&self) -> Result<Profile, ApiError> {
        self.require_token()?;
        let state = lock(&self.state);
        match state.token.as_deref() {
            Some("T2") => Ok(peer("u9", "New User")),
            _ => Ok(state.me.clone()),
        }
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        self.require_token()?;
        let mut state = lock(&self.state);
        if let Some(name) = &update.full_name {
            state.me.full_name = name.clone();
        }
        if let Some(bio) = &update.bio {
            state.me.bio = Some(bio.clone());
        }
        if let Some(pic) = &update.profile_pic {
            state.me.profile_pic = Some(pic.clone());
        }
        Ok(state.me.clone())
    }
}

#[async_trait]
impl MessagingApi for FakeApi {
    async fn list_users(&self) -> Result<Roster, ApiError> {
        self.require_token()?;
        let state = lock(&self.state);
        if state.roster_failure {
            return Err(ApiError::Status {
                status: 503,
                message: "Service unavailable".into(),
            });
        }
        Ok(state.roster.clone())
    }

    async fn fetch_history(&self, peer: &UserId) -> Result<Vec<Message>, ApiError> {
        self.require_token()?;
        let gate = {
            let mut state = lock(&self.state);
            state.history_calls.push(peer.clone());
            state.gates.get(peer).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let state = lock(&self.state);
        Ok(state.history.get(peer).cloned().unwrap_or_else(|| {
            vec![msg(&format!("h-{peer}"), peer.as_str(), state.me.id.as_str())]
        }))
    }

    async fn send_message(
        &self,
        peer: &UserId,
        message: &OutgoingMessage,
    ) -> Result<Message, ApiError> {
        self.require_token()?;
        let mut state = lock(&self.state);
        if let Some(reason) = &state.send_failure {
            return Err(ApiError::Rejected(reason.clone()));
        }
        state.sent.push((peer.clone(), message.clone()));
        let id = format!("s{}", state.sent.len());
        let mut sent = msg(&id, state.me.id.as_str(), peer.as_str());
        sent.text = message.text.clone();
        sent.image = message.image.clone();
        Ok(sent)
    }

    async fn mark_seen(&self, id: &MessageId) -> Result<(), ApiError> {
        self.require_token()?;
        let mut state = lock(&self.state);
        if state.mark_failure {
            return Err(ApiError::Status {
                status: 500,
                message: "Internal server error".into(),
            });
        }
        state.marked.push(id.as_str().to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TransportState {
    senders: Vec<mpsc::Sender<ChannelNotification>>,
    connects: Vec<UserId>,
    fail_next: bool,
}

/// Hands out channels whose server side the test drives directly.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
    teardowns: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_connect(&self) {
        lock(&self.state).fail_next = true;
    }

    pub fn connects(&self) -> Vec<UserId> {
        lock(&self.state).connects.clone()
    }

    /// How many channels have been released by their owner.
    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn latest_sender(&self) -> Option<mpsc::Sender<ChannelNotification>> {
        lock(&self.state).senders.last().cloned()
    }

    /// Deliver `event` on the most recently opened channel.
    pub fn push(&self, event: ServerEvent) {
        let tx = self.latest_sender().expect("no channel opened");
        tx.try_send(ChannelNotification::Event(event))
            .expect("channel queue full or closed");
    }

    /// Simulate the server ending the most recent connection.
    pub fn drop_connection(&self, reason: Option<&str>) {
        let tx = lock(&self.state).senders.pop().expect("no channel opened");
        let _ = tx.try_send(ChannelNotification::Closed {
            reason: reason.map(str::to_string),
        });
    }
}

#[async_trait]
impl RealtimeTransport for FakeTransport {
    async fn connect(&self, user_id: &UserId) -> Result<ChannelHandle, ChannelError> {
        let mut state = lock(&self.state);
        state.connects.push(user_id.clone());
        if std::mem::take(&mut state.fail_next) {
            return Err(ChannelError::Connect("connection refused".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(1);
        let teardowns = self.teardowns.clone();
        let task = tokio::spawn(async move {
            // Close command or the handle being dropped
            let _ = cmd_rx.recv().await;
            teardowns.fetch_add(1, Ordering::SeqCst);
        });
        state.senders.push(tx);
        Ok(ChannelHandle::new(rx, cmd_tx, Some(task)))
    }
}
