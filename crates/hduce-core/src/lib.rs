//! Core library for the HDUCE portal client.
//!
//! - `auth`: token storage, token inspection and the authentication endpoints
//! - `api`: the HTTP gateway every request passes through
//! - `session`: the session controller that ties them together
//! - `models`: user profile and portal resources
//! - `config`: on-disk configuration and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiError, HttpGateway, Navigator};
pub use auth::{AuthClient, AuthError, TokenStore};
pub use config::Config;
pub use models::{Role, UserProfile};
pub use session::{Session, SessionController, SessionError, SessionOptions, SessionPhase};
