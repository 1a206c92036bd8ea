//! High-level credential store for the authenticated session.
//!
//! A session is always written as one JSON record under
//! [`StorageKeys::SESSION`], so readers observe either the previous session or
//! the new one in full.
//!
//! Two layers are kept:
//! - a volatile in-process layer that always holds the complete session
//! - the durable backend, which only receives the refresh token when the user
//!   asked to be remembered

use crate::{MemoryStorage, SecureStorage, Session, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session record as written to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(flatten)]
    pub session: Session,
    /// When this record was written.
    pub saved_at: DateTime<Utc>,
}

/// Durable mirror of the current session.
pub struct CredentialStore {
    durable: Box<dyn SecureStorage>,
    volatile: MemoryStorage,
}

impl CredentialStore {
    /// Create a credential store over the given durable backend.
    pub fn new(durable: Box<dyn SecureStorage>) -> Self {
        Self {
            durable,
            volatile: MemoryStorage::new(),
        }
    }

    /// Persist the whole session.
    ///
    /// The refresh token reaches durable storage only when "remember me" is set.
    pub fn save(&self, session: &Session) -> StorageResult<()> {
        let remember_me = self.remember_me()?;
        let record = PersistedSession {
            session: session.clone(),
            saved_at: Utc::now(),
        };

        let durable_record = if remember_me {
            record.clone()
        } else {
            PersistedSession {
                session: Session {
                    refresh_token: None,
                    ..record.session.clone()
                },
                saved_at: record.saved_at,
            }
        };

        self.durable
            .set(StorageKeys::SESSION, &serde_json::to_string(&durable_record)?)?;
        self.volatile
            .set(StorageKeys::SESSION, &serde_json::to_string(&record)?)?;

        debug!(
            user_id = %session.user.id,
            remember_me,
            has_refresh = session.refresh_token.is_some(),
            "Session saved"
        );
        Ok(())
    }

    /// Load the current session, if any.
    pub fn load(&self) -> StorageResult<Option<Session>> {
        Ok(self.load_record()?.map(|record| record.session))
    }

    /// Load the current session together with its write timestamp.
    ///
    /// The volatile copy wins because it is the only one guaranteed to carry
    /// the refresh token.
    pub fn load_record(&self) -> StorageResult<Option<PersistedSession>> {
        let raw = match self.volatile.get(StorageKeys::SESSION)? {
            Some(raw) => Some(raw),
            None => self.durable.get(StorageKeys::SESSION)?,
        };

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Check whether a session record exists without decoding it.
    pub fn has_session(&self) -> StorageResult<bool> {
        Ok(self.volatile.has(StorageKeys::SESSION)? || self.durable.has(StorageKeys::SESSION)?)
    }

    /// Remove every stored credential. Safe to call when nothing is stored.
    pub fn clear(&self) -> StorageResult<()> {
        self.volatile.delete(StorageKeys::SESSION)?;
        self.volatile.delete(StorageKeys::REMEMBER_ME)?;
        let had_session = self.durable.delete(StorageKeys::SESSION)?;
        self.durable.delete(StorageKeys::REMEMBER_ME)?;

        debug!(had_session, "Credentials cleared");
        Ok(())
    }

    /// Record the "remember me" choice made at login.
    pub fn set_remember_me(&self, remember_me: bool) -> StorageResult<()> {
        let value = if remember_me { "true" } else { "false" };
        self.durable.set(StorageKeys::REMEMBER_ME, value)?;
        self.volatile.set(StorageKeys::REMEMBER_ME, value)
    }

    /// The "remember me" choice, defaulting to false.
    pub fn remember_me(&self) -> StorageResult<bool> {
        let raw = match self.volatile.get(StorageKeys::REMEMBER_ME)? {
            Some(raw) => Some(raw),
            None => self.durable.get(StorageKeys::REMEMBER_ME)?,
        };

        Ok(match raw.as_deref() {
            Some("true") => true,
            Some("false") | None => false,
            Some(other) => {
                warn!(value = %other, "Unrecognised remember_me value, treating as false");
                false
            }
        })
    }
}
