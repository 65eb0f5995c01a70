use thiserror::Error;

/// Failure of a REST call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered `success: false` with a user-facing message.
    #[error("{0}")]
    Rejected(String),

    /// Non-2xx HTTP status.
    #[error("Server responded {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, TLS or timeout failure.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body did not match the expected shape.
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Text suitable for a user notification.
    ///
    /// Server-supplied messages are passed through; transport failures get
    /// their generic description.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected(message) => message.clone(),
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the server itself refused the request (as opposed to the
    /// request never completing).
    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Rejected(_) | ApiError::Status { .. })
    }
}

/// Failure of the realtime channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Realtime connection failed: {0}")]
    Connect(String),

    #[error("Invalid realtime URL: {0}")]
    InvalidUrl(String),
}
