//! Realtime channel over WebSocket with a tokio mpsc command/notification
//! pattern.
//!
//! The socket loop runs in a dedicated tokio task. The owner talks to it
//! through a [`ChannelHandle`]: notifications come out in the order the
//! server sent them, and dropping the handle (or sending
//! [`ChannelCommand::Close`]) ends the task and closes the socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

use murmur_shared::constants::{DEFAULT_EVENT_BUFFER, REALTIME_PATH, REALTIME_USER_PARAM};
use murmur_shared::protocol::ServerEvent;
use murmur_shared::types::UserId;

use crate::error::ChannelError;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the channel task.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Close the socket and stop the task.
    Close,
}

/// Notifications sent *from* the channel task to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelNotification {
    /// A decoded server event.
    Event(ServerEvent),
    /// The remote side or the transport ended the connection.
    Closed { reason: Option<String> },
}

/// Owner's end of one open channel.
pub struct ChannelHandle {
    events: mpsc::Receiver<ChannelNotification>,
    commands: mpsc::Sender<ChannelCommand>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn new(
        events: mpsc::Receiver<ChannelNotification>,
        commands: mpsc::Sender<ChannelCommand>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            events,
            commands,
            task,
        }
    }

    /// Next notification in arrival order. `None` once the task has exited
    /// and every buffered notification was consumed.
    pub async fn recv(&mut self) -> Option<ChannelNotification> {
        self.events.recv().await
    }

    /// Ask the task to close the socket and wait for it to finish.
    ///
    /// Notifications still buffered are discarded with the handle.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(ChannelCommand::Close).await;
        self.events.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Realtime task ended abnormally");
                }
            }
        }
    }
}

/// Opens realtime channels bound to a user id.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Complete the transport handshake and return the live channel.
    async fn connect(&self, user_id: &UserId) -> Result<ChannelHandle, ChannelError>;
}

/// WebSocket implementation of [`RealtimeTransport`].
#[derive(Debug, Clone)]
pub struct WsTransport {
    server_url: String,
    buffer: usize,
}

impl WsTransport {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// `http(s)://host` → `ws(s)://host/ws?userId=<id>`
    pub fn channel_url(&self, user_id: &UserId) -> Result<String, ChannelError> {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(ChannelError::InvalidUrl(format!(
                "'{}' must start with http(s):// or ws(s)://",
                self.server_url
            )));
        };

        let mut url = reqwest::Url::parse(&format!("{ws_base}{REALTIME_PATH}"))
            .map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair(REALTIME_USER_PARAM, user_id.as_str());
        Ok(url.to_string())
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn connect(&self, user_id: &UserId) -> Result<ChannelHandle, ChannelError> {
        let url = self.channel_url(user_id)?;
        spawn_channel(&url, self.buffer).await
    }
}

enum Exit {
    Local,
    Remote(Option<String>),
}

/// Connect to `url` and spawn the socket loop.
pub async fn spawn_channel(url: &str, buffer: usize) -> Result<ChannelHandle, ChannelError> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| ChannelError::Connect(e.to_string()))?;

    info!(url = %url, "Realtime channel connected");

    let (mut write, mut read) = ws_stream.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ChannelCommand>(8);
    let (notif_tx, notif_rx) = mpsc::channel::<ChannelNotification>(buffer.max(1));

    let task = tokio::spawn(async move {
        let exit = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ChannelCommand::Close) => {
                            debug!("Realtime channel close requested");
                            break Exit::Local;
                        }
                        None => {
                            debug!("Command channel closed, shutting down realtime channel");
                            break Exit::Local;
                        }
                    }
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => match ServerEvent::decode(&text) {
                            Ok(Some(event)) => {
                                debug!(event = event.name(), "Realtime event received");
                                if notif_tx.send(ChannelNotification::Event(event)).await.is_err() {
                                    break Exit::Local;
                                }
                            }
                            Ok(None) => debug!("Ignoring unhandled realtime event"),
                            Err(e) => warn!(error = %e, "Dropping malformed realtime frame"),
                        },
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = write.send(WsMessage::Pong(data)).await;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            break Exit::Remote(frame.map(|f| f.reason.to_string()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Realtime transport error");
                            break Exit::Remote(Some(e.to_string()));
                        }
                        None => break Exit::Remote(None),
                    }
                }
            }
        };

        match exit {
            Exit::Local => {
                let _ = write.send(WsMessage::Close(None)).await;
                let _ = write.close().await;
            }
            Exit::Remote(reason) => {
                info!(reason = ?reason, "Realtime channel closed by remote");
                let _ = notif_tx.send(ChannelNotification::Closed { reason }).await;
            }
        }

        info!("Realtime channel task terminated");
    });

    Ok(ChannelHandle::new(notif_rx, cmd_tx, Some(task)))
}
