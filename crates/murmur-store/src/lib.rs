//! # murmur-store
//!
//! Local persistent state for the Murmur client, backed by SQLite.
//!
//! The only thing the client keeps across restarts is a small key/value
//! table mirroring browser local storage; the session token lives there
//! under [`TOKEN_KEY`](murmur_shared::constants::TOKEN_KEY).  Message
//! history is never cached locally: the server is the source of truth.

pub mod database;
pub mod local;
pub mod migrations;
pub mod token;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use token::{MemoryTokenStore, TokenStore};
