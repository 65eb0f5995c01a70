// Transport layer: REST calls to the auth/messaging services and the
// realtime WebSocket channel.

pub mod api;
pub mod channel;
pub mod error;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, AuthApi, ChatApi, MessagingApi};
pub use channel::{
    spawn_channel, ChannelCommand, ChannelHandle, ChannelNotification, RealtimeTransport,
    WsTransport,
};
pub use error::{ApiError, ChannelError};
