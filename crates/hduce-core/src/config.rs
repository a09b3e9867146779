//! Application configuration management.
//!
//! Configuration holds the portal base URL, the last email used to log in
//! and the token storage backend. It is stored at
//! `~/.config/hduce/config.json`; environment variables override it:
//! - `HDUCE_API_URL`: portal base URL
//! - `HDUCE_STORAGE`: `file`, `keyring` or `sealed`
//! - `HDUCE_STORE_PASSPHRASE`: passphrase for the `sealed` backend

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileStorage, KeyringStorage, SealedFileStorage, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "hduce";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Token store file names in the cache directory
const SESSION_FILE: &str = "session.json";
const SEALED_SESSION_FILE: &str = "session.sealed.json";

/// Base URL used when neither config nor environment sets one.
pub const DEFAULT_API_URL: &str = "http://localhost";

pub const ENV_API_URL: &str = "HDUCE_API_URL";
pub const ENV_STORAGE: &str = "HDUCE_STORAGE";
pub const ENV_STORE_PASSPHRASE: &str = "HDUCE_STORE_PASSPHRASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Sealed,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            "sealed" => Ok(StorageBackend::Sealed),
            other => Err(anyhow::anyhow!(
                "Unknown storage backend '{}' (expected file, keyring or sealed)",
                other
            )),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::File => "file",
            StorageBackend::Keyring => "keyring",
            StorageBackend::Sealed => "sealed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_email: Option<String>,
    pub storage: Option<StorageBackend>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Portal base URL: environment, then config, then `DEFAULT_API_URL`.
    pub fn api_url(&self) -> String {
        self.api_url_with(std::env::var(ENV_API_URL).ok())
    }

    fn api_url_with(&self, env: Option<String>) -> String {
        env.filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn storage_backend(&self) -> Result<StorageBackend> {
        self.storage_backend_with(std::env::var(ENV_STORAGE).ok())
    }

    fn storage_backend_with(&self, env: Option<String>) -> Result<StorageBackend> {
        match env.filter(|v| !v.trim().is_empty()) {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid {}", ENV_STORAGE)),
            None => Ok(self.storage.unwrap_or_default()),
        }
    }

    /// Open the token store for the configured backend.
    pub fn open_token_store(&self) -> Result<TokenStore> {
        let backend = self.storage_backend()?;
        let passphrase = std::env::var(ENV_STORE_PASSPHRASE).ok();
        self.open_token_store_in(&self.cache_dir()?, backend, passphrase.as_deref())
    }

    fn open_token_store_in(
        &self,
        cache_dir: &Path,
        backend: StorageBackend,
        passphrase: Option<&str>,
    ) -> Result<TokenStore> {
        tracing::debug!(%backend, "Opening token store");
        let store = match backend {
            StorageBackend::File => TokenStore::new(FileStorage::new(cache_dir.join(SESSION_FILE))),
            StorageBackend::Keyring => {
                TokenStore::new(KeyringStorage::open().context("Cannot use keyring storage")?)
            }
            StorageBackend::Sealed => {
                let passphrase = passphrase.with_context(|| {
                    format!("{} must be set to use sealed storage", ENV_STORE_PASSPHRASE)
                })?;
                let storage =
                    SealedFileStorage::open(cache_dir.join(SEALED_SESSION_FILE), passphrase)
                        .context("Failed to open sealed session file")?;
                TokenStore::new(storage)
            }
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::token_with_exp;

    #[test]
    fn test_api_url_precedence() {
        let mut config = Config::default();
        assert_eq!(config.api_url_with(None), DEFAULT_API_URL);

        config.api_url = Some("http://portal.internal".to_string());
        assert_eq!(config.api_url_with(None), "http://portal.internal");
        assert_eq!(config.api_url_with(Some("  ".to_string())), "http://portal.internal");
        assert_eq!(
            config.api_url_with(Some("http://from-env".to_string())),
            "http://from-env"
        );
    }

    #[test]
    fn test_storage_backend_selection() {
        let mut config = Config::default();
        assert_eq!(config.storage_backend_with(None).unwrap(), StorageBackend::File);

        config.storage = Some(StorageBackend::Keyring);
        assert_eq!(config.storage_backend_with(None).unwrap(), StorageBackend::Keyring);
        assert_eq!(
            config.storage_backend_with(Some("SEALED".to_string())).unwrap(),
            StorageBackend::Sealed
        );
        assert!(config.storage_backend_with(Some("cloud".to_string())).is_err());
    }

    #[test]
    fn test_config_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hduce").join(CONFIG_FILE);

        assert!(Config::load_from(&path).unwrap().last_email.is_none());

        let config = Config {
            api_url: Some("http://localhost:8000".to_string()),
            last_email: Some("ana@hduce.test".to_string()),
            storage: Some(StorageBackend::Sealed),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.last_email.as_deref(), Some("ana@hduce.test"));
        assert_eq!(loaded.storage, Some(StorageBackend::Sealed));
        assert!(std::fs::read_to_string(&path).unwrap().contains(r#""storage": "sealed""#));
    }

    #[test]
    fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Config::default()
            .open_token_store_in(dir.path(), StorageBackend::File, None)
            .unwrap();

        store.save_token(&token_with_exp(60)).unwrap();
        assert!(dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_sealed_store_requires_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        assert!(config
            .open_token_store_in(dir.path(), StorageBackend::Sealed, None)
            .is_err());

        let store = config
            .open_token_store_in(dir.path(), StorageBackend::Sealed, Some("pass"))
            .unwrap();
        store.save_token("tok").unwrap();
        assert_eq!(store.token().unwrap().as_deref(), Some("tok"));
    }
}
