//! # murmur-client
//!
//! Sync core of the Murmur chat client: session lifecycle, the realtime
//! presence channel, per-conversation state and message delivery, owned by a
//! single [`ChatClient`] context.

pub mod config;
pub mod context;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod events;
pub mod presence;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use context::ChatClient;
pub use conversation::{ConversationStore, HistoryOutcome, RosterEntry};
pub use delivery::{DeliveryCoordinator, Inbound};
pub use error::{AuthError, ChannelError, ClientError, NetworkError, SendError, StoreError};
pub use events::{ClientEvent, EventBus, Notice, NoticeLevel};
pub use presence::{PresenceChannel, PresenceEvent};
pub use session::{Session, SessionStore};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("murmur_client=debug,murmur_net=debug,murmur_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
