//! Authentication building blocks.
//!
//! This module provides:
//! - `TokenStore`: persisted bearer token and user profile
//! - `token`: offline decoding and expiry checks of bearer tokens
//! - `AuthClient`: login, verification and current-user calls
//! - Storage backends: memory, JSON file, OS keychain, encrypted file

pub mod client;
pub mod credentials;
pub mod sealed;
pub mod storage;
pub mod store;
pub mod token;

pub use client::{AuthClient, AuthError, LoginResult};
pub use credentials::KeyringStorage;
pub use sealed::SealedFileStorage;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use store::{StoredSession, TokenStore, TOKEN_KEY, USER_KEY};
pub use token::{Claims, DecodeError};
