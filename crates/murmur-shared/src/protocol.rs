use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{EVENT_NEW_MESSAGE, EVENT_ONLINE_USERS};
use crate::error::ProtocolError;
use crate::types::{Message, Peer, Profile, UserId};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /auth/{login|register}`.
///
/// `full_name` and `bio` are only read by the server on registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl Credentials {
    pub fn login(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn register(
        full_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        bio: Option<String>,
    ) -> Self {
        Self {
            full_name: Some(full_name.into()),
            email: email.into(),
            password: password.into(),
            bio,
        }
    }
}

/// Body of `PUT /auth/update-profile`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

/// Body of `POST /messages/send/{peerId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl OutgoingMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            text: Some(body.into()),
            image: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty()) && self.image.is_none()
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Common `{success, message}` envelope carried by every API response.
pub trait ApiEnvelope {
    fn success(&self) -> bool;
    fn message(&self) -> Option<&str>;
}

macro_rules! envelope {
    ($ty:ty) => {
        impl ApiEnvelope for $ty {
            fn success(&self) -> bool {
                self.success
            }

            fn message(&self) -> Option<&str> {
                self.message.as_deref()
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    // login answers with `userData`, register and check with `user`
    #[serde(default, alias = "userData")]
    pub user: Option<Profile>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub success: bool,
    #[serde(default, alias = "userData")]
    pub user: Option<Profile>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersResponse {
    pub success: bool,
    #[serde(default)]
    pub users: Vec<Peer>,
    #[serde(default)]
    pub unseen_messages: HashMap<UserId, u32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    #[serde(default)]
    pub new_message: Option<Message>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

envelope!(AuthResponse);
envelope!(ProfileResponse);
envelope!(UsersResponse);
envelope!(MessagesResponse);
envelope!(SendResponse);
envelope!(AckResponse);

/// The roster fetch result: peers plus the unseen counters from the same query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub peers: Vec<Peer>,
    pub unseen: HashMap<UserId, u32>,
}

/// A successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub token: String,
    pub user: Profile,
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Realtime frames
// ---------------------------------------------------------------------------

/// Events pushed by the server over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Full replacement list of currently online user ids.
    OnlineUsers(Vec<UserId>),
    /// A message addressed to the session holder.
    NewMessage(Message),
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ServerEvent {
    /// Decode one text frame `{"event": ..., "data": ...}`.
    ///
    /// Returns `Ok(None)` for event names this client does not handle.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let frame: Frame =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let event = match frame.event.as_str() {
            EVENT_ONLINE_USERS => ServerEvent::OnlineUsers(
                serde_json::from_value(frame.data)
                    .map_err(|e| ProtocolError::Payload(frame.event.clone(), e.to_string()))?,
            ),
            EVENT_NEW_MESSAGE => ServerEvent::NewMessage(
                serde_json::from_value(frame.data)
                    .map_err(|e| ProtocolError::Payload(frame.event.clone(), e.to_string()))?,
            ),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Encode to the same frame shape the server emits.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let frame = match self {
            ServerEvent::OnlineUsers(ids) => Frame {
                event: EVENT_ONLINE_USERS.to_string(),
                data: serde_json::to_value(ids)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?,
            },
            ServerEvent::NewMessage(msg) => Frame {
                event: EVENT_NEW_MESSAGE.to_string(),
                data: serde_json::to_value(msg)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?,
            },
        };
        serde_json::to_string(&frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => EVENT_ONLINE_USERS,
            ServerEvent::NewMessage(_) => EVENT_NEW_MESSAGE,
        }
    }
}
