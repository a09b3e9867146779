//! Encrypted variant of `FileStorage`.
//!
//! Values are sealed with ChaCha20-Poly1305 under a key derived from a
//! passphrase with Argon2id. The random salt lives in the same file under
//! `SALT_KEY`; each value gets a fresh nonce, stored in front of the
//! ciphertext and base64-encoded.

use std::path::PathBuf;

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use super::storage::{FileStorage, KeyValueStorage, StorageError};

const SALT_KEY: &str = "__salt";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

pub struct SealedFileStorage {
    inner: FileStorage,
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SealedFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedFileStorage")
            .field("path", &self.inner.path())
            .finish_non_exhaustive()
    }
}

impl SealedFileStorage {
    /// Open (or create) the sealed file at `path`.
    pub fn open(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, StorageError> {
        if passphrase.is_empty() {
            return Err(StorageError::Crypto("passphrase must not be empty".to_string()));
        }

        let inner = FileStorage::new(path);
        let salt = match inner.get(SALT_KEY)? {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| StorageError::Crypto(format!("corrupt salt: {}", e)))?,
            None => {
                let mut salt = [0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                inner.set(SALT_KEY, &STANDARD.encode(salt))?;
                salt.to_vec()
            }
        };

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| StorageError::Crypto(format!("key derivation failed: {}", e)))?;

        Ok(Self {
            inner,
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    fn seal(&self, plaintext: &str) -> Result<String, StorageError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| StorageError::Crypto("encryption failed".to_string()))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn open_value(&self, sealed: &str) -> Result<String, StorageError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|e| StorageError::Crypto(format!("corrupt value: {}", e)))?;
        if bytes.len() < NONCE_LEN {
            return Err(StorageError::Crypto("sealed value too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Crypto("wrong passphrase or tampered value".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| StorageError::Crypto("decrypted value is not UTF-8".to_string()))
    }
}

impl KeyValueStorage for SealedFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.inner.get(key)? {
            Some(sealed) => self.open_value(&sealed).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_many(&[key])
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let sealed = entries
            .iter()
            .map(|(key, value)| Ok((*key, self.seal(value)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;
        let borrowed: Vec<(&str, &str)> = sealed.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.inner.set_many(&borrowed)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.inner.remove_many(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sealed_values_round_trip_and_are_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.sealed.json");

        let storage = SealedFileStorage::open(&path, "correct horse").unwrap();
        storage.set("hduce_token", "secret-token").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secret-token"));
        assert!(raw.contains(SALT_KEY));

        let reopened = SealedFileStorage::open(&path, "correct horse").unwrap();
        assert_eq!(
            reopened.get("hduce_token").unwrap().as_deref(),
            Some("secret-token")
        );
    }

    #[test]
    fn test_wrong_passphrase_fails_to_open_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.sealed.json");

        SealedFileStorage::open(&path, "right")
            .unwrap()
            .set("hduce_token", "secret-token")
            .unwrap();

        let wrong = SealedFileStorage::open(&path, "wrong").unwrap();
        assert!(matches!(wrong.get("hduce_token"), Err(StorageError::Crypto(_))));
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = SealedFileStorage::open(dir.path().join("s.json"), "");
        assert!(matches!(result, Err(StorageError::Crypto(_))));
    }
}
