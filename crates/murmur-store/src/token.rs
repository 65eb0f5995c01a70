//! Persistence seam for the session token.

use std::sync::Mutex;

use murmur_shared::constants::TOKEN_KEY;

use crate::database::Database;
use crate::error::Result;

/// Where the session token survives process restarts.
///
/// Absent on first run; `clear` on an empty store is a no-op.
pub trait TokenStore: Send {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

impl TokenStore for Database {
    fn load(&self) -> Result<Option<String>> {
        self.get_item(TOKEN_KEY)
    }

    fn save(&self, token: &str) -> Result<()> {
        self.set_item(TOKEN_KEY, token)
    }

    fn clear(&self) -> Result<()> {
        self.remove_item(TOKEN_KEY).map(|_| ())
    }
}

/// Non-persistent token store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.token.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}
