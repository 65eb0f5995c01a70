//! REST client for the auth and messaging services.
//!
//! [`AuthApi`] and [`MessagingApi`] are the seams the client core consumes;
//! [`ApiClient`] implements both over `reqwest`.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use murmur_shared::constants::API_PREFIX;
use murmur_shared::protocol::{
    AckResponse, ApiEnvelope, AuthGrant, AuthResponse, Credentials, MessagesResponse,
    OutgoingMessage, ProfileResponse, ProfileUpdate, Roster, SendResponse, UsersResponse,
};
use murmur_shared::types::{AuthMode, Message, MessageId, Profile, UserId};

use crate::error::ApiError;

/// Authentication endpoints plus the bearer header they establish.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Attach (`Some`) or detach (`None`) the bearer token sent with every
    /// subsequent call.
    fn set_token(&self, token: Option<&str>);

    async fn authenticate(
        &self,
        mode: AuthMode,
        credentials: &Credentials,
    ) -> Result<AuthGrant, ApiError>;

    async fn check_auth(&self) -> Result<Profile, ApiError>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError>;
}

/// Roster, history and delivery endpoints.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn list_users(&self) -> Result<Roster, ApiError>;

    /// Full history with `peer`. The server marks the peer's messages as
    /// seen as a side effect of this call.
    async fn fetch_history(&self, peer: &UserId) -> Result<Vec<Message>, ApiError>;

    async fn send_message(
        &self,
        peer: &UserId,
        message: &OutgoingMessage,
    ) -> Result<Message, ApiError>;

    async fn mark_seen(&self, id: &MessageId) -> Result<(), ApiError>;
}

/// Everything the client core needs from the REST side.
pub trait ChatApi: AuthApi + MessagingApi {}

impl<T: AuthApi + MessagingApi> ChatApi for T {}

/// `reqwest`-backed implementation of the REST seams.
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = server_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidUrl(format!(
                "'{server_url}' must start with http:// or https://"
            )));
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The bearer token currently attached, if any.
    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn execute<T>(&self, req: RequestBuilder) -> Result<T, ApiError>
    where
        T: DeserializeOwned + ApiEnvelope,
    {
        let resp = self.authorized(req).send().await?;
        let status = resp.status();
        let url = resp.url().path().to_string();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<AckResponse>(&bytes)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                });
            warn!(path = %url, status = status.as_u16(), %message, "API call failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: T =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;

        if !body.success() {
            let message = body.message().unwrap_or("Request failed").to_string();
            debug!(path = %url, %message, "API call rejected");
            return Err(ApiError::Rejected(message));
        }

        Ok(body)
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    fn set_token(&self, token: Option<&str>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token.map(str::to_string);
    }

    async fn authenticate(
        &self,
        mode: AuthMode,
        credentials: &Credentials,
    ) -> Result<AuthGrant, ApiError> {
        let path = format!("/auth/{}", mode.as_path());
        let body: AuthResponse = self
            .execute(self.http.post(self.url(&path)).json(credentials))
            .await?;

        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Decode("missing token".into()))?;
        let user = body
            .user
            .ok_or_else(|| ApiError::Decode("missing user".into()))?;

        Ok(AuthGrant {
            token,
            user,
            message: body.message,
        })
    }

    async fn check_auth(&self) -> Result<Profile, ApiError> {
        let body: ProfileResponse = self.execute(self.http.get(self.url("/auth/check"))).await?;
        body.user
            .ok_or_else(|| ApiError::Decode("missing user".into()))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        let body: ProfileResponse = self
            .execute(self.http.put(self.url("/auth/update-profile")).json(update))
            .await?;
        body.user
            .ok_or_else(|| ApiError::Decode("missing user".into()))
    }
}

#[async_trait]
impl MessagingApi for ApiClient {
    async fn list_users(&self) -> Result<Roster, ApiError> {
        let body: UsersResponse = self
            .execute(self.http.get(self.url("/messages/users")))
            .await?;
        Ok(Roster {
            peers: body.users,
            unseen: body.unseen_messages,
        })
    }

    async fn fetch_history(&self, peer: &UserId) -> Result<Vec<Message>, ApiError> {
        let path = format!("/messages/{peer}");
        let body: MessagesResponse = self.execute(self.http.get(self.url(&path))).await?;
        Ok(body.messages)
    }

    async fn send_message(
        &self,
        peer: &UserId,
        message: &OutgoingMessage,
    ) -> Result<Message, ApiError> {
        let path = format!("/messages/send/{peer}");
        let body: SendResponse = self
            .execute(self.http.post(self.url(&path)).json(message))
            .await?;
        body.new_message
            .ok_or_else(|| ApiError::Decode("missing newMessage".into()))
    }

    async fn mark_seen(&self, id: &MessageId) -> Result<(), ApiError> {
        let path = format!("/messages/mark/{id}");
        let _: AckResponse = self.execute(self.http.put(self.url(&path))).await?;
        Ok(())
    }
}
