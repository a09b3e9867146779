//! Session state for one application instance.
//!
//! `SessionController` restores the session at startup, handles login and
//! logout, and re-checks the stored token every `CHECK_INTERVAL_SECS` while
//! signed in. State changes are published on a `tokio::sync::watch` channel.

pub mod controller;
pub mod state;

pub use controller::{SessionController, SessionError, SessionOptions, CHECK_INTERVAL_SECS};
pub use state::{Session, SessionPhase};
