use std::sync::Arc;

use tracing::{debug, warn};

use super::storage::{KeyValueStorage, MemoryStorage, StorageError};
use crate::models::UserProfile;

/// Storage key for the bearer token.
pub const TOKEN_KEY: &str = "hduce_token";

/// Storage key for the serialized user profile.
pub const USER_KEY: &str = "hduce_user";

/// Keys written by older portal builds. Read as a fallback, always cleared.
const LEGACY_TOKEN_KEY: &str = "token";
const LEGACY_USER_KEY: &str = "user";

/// What `TokenStore::load` found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSession {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
}

/// Persists the bearer token and user profile. Pure storage: nothing here
/// checks whether the token is any good.
///
/// Clone is cheap - all clones share the same backend.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(storage: impl KeyValueStorage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Persist token and profile together.
    pub fn save(&self, token: &str, user: &UserProfile) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(user)?;
        self.storage
            .set_many(&[(TOKEN_KEY, token), (USER_KEY, user_json.as_str())])?;
        debug!(token_len = token.len(), user_id = user.id, "Saved token and user");
        Ok(())
    }

    /// Persist a new token. Any cached profile belonged to the previous
    /// credential and is dropped.
    pub fn save_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set(TOKEN_KEY, token)?;
        self.storage.remove(USER_KEY)?;
        debug!(token_len = token.len(), "Saved token");
        Ok(())
    }

    pub fn save_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        self.storage.set(USER_KEY, &serde_json::to_string(user)?)
    }

    pub fn token(&self) -> Result<Option<String>, StorageError> {
        if let Some(token) = self.storage.get(TOKEN_KEY)? {
            return Ok(Some(token));
        }
        self.storage.get(LEGACY_TOKEN_KEY)
    }

    /// Stored profile; an unreadable blob counts as absent.
    pub fn user(&self) -> Result<Option<UserProfile>, StorageError> {
        let Some(raw) = self.storage.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored user profile");
                Ok(None)
            }
        }
    }

    pub fn load(&self) -> Result<StoredSession, StorageError> {
        Ok(StoredSession {
            token: self.token()?,
            user: self.user()?,
        })
    }

    /// Remove token and profile, including legacy keys.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage
            .remove_many(&[TOKEN_KEY, USER_KEY, LEGACY_TOKEN_KEY, LEGACY_USER_KEY])?;
        debug!("Cleared stored session");
        Ok(())
    }
}
