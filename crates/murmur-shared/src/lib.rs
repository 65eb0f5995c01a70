//! Types shared by every Murmur crate: the server's user and message
//! records, REST request/response bodies, and realtime event frames.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
