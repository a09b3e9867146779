use serde::Serialize;

use crate::models::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Session state as published to the rest of the application.
/// Never persisted: rebuilt from the token store and the server at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Session {
    pub phase: SessionPhase,
    #[serde(skip)]
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub error: Option<String>,
}

impl Session {
    pub fn uninitialized() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            token: None,
            user: None,
            error: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            ..Self::uninitialized()
        }
    }

    pub fn authenticated(token: String, user: Option<UserProfile>) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            token: Some(token),
            user,
            error: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    /// True until the startup check or a login attempt has settled.
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Uninitialized | SessionPhase::Loading)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::uninitialized()
    }
}
