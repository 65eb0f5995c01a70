//! In-process fake of the chat backend for exercising the HTTP client and the
//! realtime channel against real sockets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message as AxumWsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use murmur_shared::protocol::ServerEvent;
use murmur_shared::types::{Message, MessageId, UserId};

pub fn sample_message(id: &str, from: &str, to: &str, text: &str) -> Message {
    Message {
        id: MessageId::new(id),
        sender_id: UserId::from(from),
        receiver_id: UserId::from(to),
        text: Some(text.to_string()),
        image: None,
        seen: false,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    }
}

#[derive(Clone)]
struct FakeState {
    marked: Arc<Mutex<Vec<String>>>,
    connected: Arc<Mutex<Vec<String>>>,
    events: broadcast::Sender<ServerEvent>,
    kill: broadcast::Sender<()>,
}

pub struct FakeServer {
    addr: SocketAddr,
    state: FakeState,
}

impl FakeServer {
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn marked(&self) -> Vec<String> {
        self.state.marked.lock().unwrap().clone()
    }

    pub fn connected_users(&self) -> Vec<String> {
        self.state.connected.lock().unwrap().clone()
    }

    pub fn push(&self, event: ServerEvent) {
        self.state.events.send(event).expect("no realtime subscribers");
    }

    pub fn disconnect_all(&self) {
        let _ = self.state.kill.send(());
    }
}

pub async fn spawn_server() -> FakeServer {
    let (events, _) = broadcast::channel(64);
    let (kill, _) = broadcast::channel(4);
    let state = FakeState {
        marked: Arc::new(Mutex::new(Vec::new())),
        connected: Arc::new(Mutex::new(Vec::new())),
        events,
        kill,
    };

    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/check", get(check))
        .route("/api/auth/update-profile", put(update_profile))
        .route("/api/messages/users", get(users))
        .route("/api/messages/:peer", get(history))
        .route("/api/messages/send/:peer", post(send))
        .route("/api/messages/mark/:id", put(mark))
        .route("/ws", get(ws_upgrade))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeServer { addr, state }
}

fn me() -> Value {
    json!({"_id": "u1", "fullName": "Me", "email": "me@x.io", "bio": "hello"})
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == "Bearer T1")
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "message": "Not authorized"})),
    )
        .into_response()
}

async fn login(Json(body): Json<Value>) -> Json<Value> {
    if body["password"] == "pw" {
        Json(json!({
            "success": true,
            "token": "T1",
            "userData": me(),
            "message": "Login successful"
        }))
    } else {
        Json(json!({"success": false, "message": "Invalid credentials"}))
    }
}

async fn register(Json(body): Json<Value>) -> Json<Value> {
    if body["email"] == "me@x.io" {
        return Json(json!({"success": false, "message": "Account already exists"}));
    }
    Json(json!({
        "success": true,
        "token": "T2",
        "user": {"_id": "u9", "fullName": body["fullName"], "email": body["email"]},
        "message": "Account created successfully"
    }))
}

async fn check(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"success": true, "user": me()})).into_response()
}

async fn update_profile(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut user = me();
    if let Some(bio) = body.get("bio") {
        user["bio"] = bio.clone();
    }
    Json(json!({"success": true, "user": user})).into_response()
}

async fn users(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "success": true,
        "users": [
            {"_id": "u2", "fullName": "Bea"},
            {"_id": "u3", "fullName": "Cy"}
        ],
        "unseenMessages": {"u3": 4}
    }))
    .into_response()
}

async fn history(headers: HeaderMap, Path(peer): Path<String>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let msg = sample_message("h1", &peer, "u1", "earlier");
    Json(json!({"success": true, "messages": [msg]})).into_response()
}

async fn send(headers: HeaderMap, Path(peer): Path<String>, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let text = body["text"].as_str().unwrap_or_default();
    let msg = sample_message("s1", "u1", &peer, text);
    Json(json!({"success": true, "newMessage": msg})).into_response()
}

async fn mark(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    state.marked.lock().unwrap().push(id);
    Json(json!({"success": true})).into_response()
}

async fn ws_upgrade(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = params.get("userId").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| serve_socket(socket, state, user))
}

async fn serve_socket(mut socket: WebSocket, state: FakeState, user: String) {
    let mut events = state.events.subscribe();
    let mut kill = state.kill.subscribe();
    state.connected.lock().unwrap().push(user.clone());

    let snapshot = ServerEvent::OnlineUsers(vec![UserId::from(user.as_str()), UserId::from("u2")]);
    if socket
        .send(AxumWsMessage::Text(snapshot.encode().unwrap()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else { break };
                if socket.send(AxumWsMessage::Text(event.encode().unwrap())).await.is_err() {
                    break;
                }
            }
            _ = kill.recv() => {
                let _ = socket.send(AxumWsMessage::Close(None)).await;
                break;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(AxumWsMessage::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
