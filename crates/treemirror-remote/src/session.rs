//! Session token persistence
//!
//! Object-tree backends obtain a session token on login. Storing it lets
//! the next run resume the session instead of logging in again.
//!
//! - [`KeyringSessionStore`] - System keyring (GNOME Keyring, KWallet, ...)
//! - [`MemorySessionStore`] - Process-local map, for tests and one-shot runs

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Keyring service name
const KEYRING_SERVICE: &str = "treemirror";

/// A session token together with the time it was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub obtained_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            obtained_at: Utc::now(),
        }
    }
}

/// Persists session tokens per account key
pub trait SessionStore: Send + Sync {
    fn load(&self, account: &str) -> Result<Option<StoredSession>>;
    fn store(&self, account: &str, session: &StoredSession) -> Result<()>;
    fn clear(&self, account: &str) -> Result<()>;
}

/// Stores sessions in the system keyring, serialized as JSON
pub struct KeyringSessionStore;

impl SessionStore for KeyringSessionStore {
    fn load(&self, account: &str) -> Result<Option<StoredSession>> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, account)
            .context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(json) => {
                let session: StoredSession = serde_json::from_str(&json)
                    .context("Failed to deserialize session from keyring")?;
                debug!(account, "Loaded session from keyring");
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account, "No session found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn store(&self, account: &str, session: &StoredSession) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, account)
            .context("Failed to create keyring entry")?;
        let json = serde_json::to_string(session).context("Failed to serialize session")?;
        entry
            .set_password(&json)
            .context("Failed to store session in keyring")?;
        debug!(account, "Stored session in keyring");
        Ok(())
    }

    fn clear(&self, account: &str) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, account)
            .context("Failed to create keyring entry")?;

        match entry.delete_credential() {
            Ok(()) => {
                info!(account, "Cleared session from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

/// In-memory session store
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredSession>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, account: &str) -> Result<Option<StoredSession>> {
        Ok(self.sessions()?.get(account).cloned())
    }

    fn store(&self, account: &str, session: &StoredSession) -> Result<()> {
        self.sessions()?.insert(account.to_string(), session.clone());
        Ok(())
    }

    fn clear(&self, account: &str) -> Result<()> {
        self.sessions()?.remove(account);
        Ok(())
    }
}
