use thiserror::Error;

use murmur_net::ApiError;
use murmur_shared::types::UserId;

pub use murmur_net::ChannelError;
pub use murmur_store::StoreError;

/// A REST call that did not produce a usable answer.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct NetworkError {
    message: String,
    #[source]
    source: ApiError,
}

impl NetworkError {
    /// Text shown to the user.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn api_error(&self) -> &ApiError {
        &self.source
    }
}

impl From<ApiError> for NetworkError {
    fn from(source: ApiError) -> Self {
        Self {
            message: source.user_message(),
            source,
        }
    }
}

/// Login, registration or profile update failure.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The server refused the request; carries its message verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// An operation that requires an identified session was called without one.
    #[error("Not logged in")]
    NotAuthenticated,
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        if err.is_rejection() {
            AuthError::Rejected(err.user_message())
        } else {
            AuthError::Network(err.into())
        }
    }
}

/// Message delivery failure.
#[derive(Error, Debug)]
pub enum SendError {
    /// The target is not the currently selected peer.
    #[error("Cannot send to {requested}: no matching selection")]
    NotSelected {
        requested: UserId,
        selected: Option<UserId>,
    },

    #[error("Message is empty")]
    Empty,

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<ApiError> for SendError {
    fn from(err: ApiError) -> Self {
        if err.is_rejection() {
            SendError::Rejected(err.user_message())
        } else {
            SendError::Network(err.into())
        }
    }
}

/// Failure to assemble a [`ChatClient`](crate::context::ChatClient) from
/// configuration.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to open local storage: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid server configuration: {0}")]
    Api(#[from] ApiError),
}
