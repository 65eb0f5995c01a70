use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use murmur_client::{ChatClient, ClientConfig, ClientEvent, HistoryOutcome, NoticeLevel};
use murmur_shared::constants::APP_NAME;
use murmur_shared::protocol::{Credentials, OutgoingMessage, ProfileUpdate};
use murmur_shared::types::{AuthMode, ChannelState, Message, UserId};

const HELP: &str = "\
commands:
  /login <email> <password>
  /register <name> <email> <password> [bio]
  /logout
  /users
  /open <peer-id>
  /bio <text>
  /quit
anything else is sent to the open conversation";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Login(Credentials),
    Register(Credentials),
    Logout,
    Users,
    Open(UserId),
    Bio(String),
    Quit,
    Help,
    Say(String),
    Usage(&'static str),
    Empty,
}

fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let mut words = command.split_whitespace();
    match words.next().unwrap_or_default() {
        "login" => match (words.next(), words.next()) {
            (Some(email), Some(password)) => Input::Login(Credentials::login(email, password)),
            _ => Input::Usage("/login <email> <password>"),
        },
        "register" => match (words.next(), words.next(), words.next()) {
            (Some(name), Some(email), Some(password)) => {
                let bio: Vec<_> = words.collect();
                let bio = (!bio.is_empty()).then(|| bio.join(" "));
                Input::Register(Credentials::register(name, email, password, bio))
            }
            _ => Input::Usage("/register <name> <email> <password> [bio]"),
        },
        "logout" => Input::Logout,
        "users" => Input::Users,
        "open" => match words.next() {
            Some(id) => Input::Open(UserId::from(id)),
            None => Input::Usage("/open <peer-id>"),
        },
        "bio" => {
            let text: Vec<_> = words.collect();
            if text.is_empty() {
                Input::Usage("/bio <text>")
            } else {
                Input::Bio(text.join(" "))
            }
        }
        "quit" | "exit" => Input::Quit,
        _ => Input::Help,
    }
}

fn print_message(message: &Message) {
    let body = message
        .text
        .as_deref()
        .or(message.image.as_ref().map(|_| "[image]"))
        .unwrap_or_default();
    println!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        message.sender_id.short(),
        body
    );
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Notice(notice) => match notice.level {
            NoticeLevel::Success => println!("* {}", notice.text),
            NoticeLevel::Error => println!("! {}", notice.text),
        },
        ClientEvent::MessageAppended { message } => print_message(message),
        ClientEvent::UnseenChanged { peer, count } if *count > 0 => {
            println!("* {count} unseen from {peer}")
        }
        ClientEvent::PresenceChanged { online } => println!("* {} online", online.len()),
        ClientEvent::ChannelStateChanged { state } => {
            if *state != ChannelState::Connecting {
                println!("* realtime {state:?}");
            }
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    murmur_client::init_tracing();

    let config = ClientConfig::from_env();
    info!(server = %config.server_url, "Starting {APP_NAME} client");

    let mut client = ChatClient::from_config(&config).context("Failed to initialise client")?;

    let mut events = client.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match client.start().await {
        Some(me) => println!("Signed in as {} ({})", me.full_name, me.id),
        None => println!("Not signed in.\n{HELP}"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = if client.channel_state() == ChannelState::Open {
            tokio::select! {
                line = lines.next_line() => line?,
                _ = client.next_event() => continue,
            }
        } else {
            lines.next_line().await?
        };
        let Some(line) = line else { break };

        match parse(&line) {
            Input::Empty => {}
            Input::Login(credentials) => {
                let _ = client.login(AuthMode::Login, &credentials).await;
            }
            Input::Register(credentials) => {
                let _ = client.login(AuthMode::Register, &credentials).await;
            }
            Input::Logout => client.logout().await,
            Input::Users => {
                if client.refresh_roster().await.is_ok() {
                    for entry in client.roster() {
                        let unseen = match entry.unseen {
                            0 => String::new(),
                            n => format!(" ({n} unseen)"),
                        };
                        println!(
                            "{} {} {}{}",
                            if entry.online { "●" } else { "○" },
                            entry.peer.id,
                            entry.peer.full_name,
                            unseen
                        );
                    }
                }
            }
            Input::Open(peer) => {
                if let Ok(HistoryOutcome::Applied { .. }) = client.open_conversation(peer).await {
                    client.messages().iter().for_each(print_message);
                }
            }
            Input::Bio(bio) => {
                let update = ProfileUpdate {
                    bio: Some(bio),
                    ..Default::default()
                };
                let _ = client.update_profile(&update).await;
            }
            Input::Say(text) => match client.selected() {
                Some(peer) => {
                    let _ = client.send_message(&peer, &OutgoingMessage::text(text)).await;
                }
                None => println!("! Open a conversation first: /open <peer-id>"),
            },
            Input::Usage(usage) => println!("usage: {usage}"),
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
        }
    }

    client.shutdown().await;
    info!("{APP_NAME} client stopped");
    Ok(())
}
