/// Application name
pub const APP_NAME: &str = "Murmur";

/// Default backend URL for local development
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Prefix shared by every REST endpoint
pub const API_PREFIX: &str = "/api";

/// Path of the realtime WebSocket endpoint
pub const REALTIME_PATH: &str = "/ws";

/// Query parameter that binds a realtime channel to a user id
pub const REALTIME_USER_PARAM: &str = "userId";

/// Local storage key holding the session token
pub const TOKEN_KEY: &str = "token";

/// Server-to-client realtime event names
pub const EVENT_ONLINE_USERS: &str = "getOnlineUsers";
pub const EVENT_NEW_MESSAGE: &str = "newMessage";

/// Default HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Default capacity of the realtime event queue and the UI event stream
pub const DEFAULT_EVENT_BUFFER: usize = 256;
