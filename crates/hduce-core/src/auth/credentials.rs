use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use keyring::credential::CredentialBuilder;
use keyring::Entry;
use tracing::debug;

use super::storage::{KeyValueStorage, StorageError};

/// Keychain service name used when none is configured.
pub const SERVICE_NAME: &str = "hduce";

/// Whether this build talks to a real OS keychain. Elsewhere keyring falls
/// back to its in-process mock, which forgets everything on exit.
pub const KEYCHAIN_AVAILABLE: bool = cfg!(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "windows"
));

/// Stores each key as its own entry in the OS keychain.
pub struct KeyringStorage {
    service: String,
    builder: Option<Box<CredentialBuilder>>,
    entries: Mutex<HashMap<String, Arc<Entry>>>,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            builder: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Keychain storage for the default service, or an error when this
    /// platform has no keychain to persist into.
    pub fn open() -> Result<Self, StorageError> {
        if !KEYCHAIN_AVAILABLE {
            return Err(StorageError::Unavailable(
                "no OS keychain on this platform; use the file or sealed backend".to_string(),
            ));
        }
        Ok(Self::default())
    }

    /// Build credentials with `builder` instead of the platform default.
    pub fn with_builder(service: impl Into<String>, builder: Box<CredentialBuilder>) -> Self {
        Self {
            builder: Some(builder),
            ..Self::new(service)
        }
    }

    /// Entries are reused for the life of the storage so every backend,
    /// including ones that only keep data per entry, reads back its writes.
    fn entry(&self, key: &str) -> Result<Arc<Entry>, StorageError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = entries.get(key) {
            return Ok(entry.clone());
        }

        let entry = match &self.builder {
            Some(builder) => Entry::new_with_credential(builder.build(None, &self.service, key)?),
            None => Entry::new(&self.service, key)?,
        };
        let entry = Arc::new(entry);
        entries.insert(key.to_string(), entry.clone());
        Ok(entry)
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl fmt::Debug for KeyringStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyringStorage")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl KeyValueStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        debug!(service = %self.service, key, "Stored keychain entry");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
