//! Session lifecycle: startup restoration, login, logout and the periodic
//! expiry check.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::state::{Session, SessionPhase};
use crate::api::HttpGateway;
use crate::auth::{token, AuthClient, AuthError, StorageError, TokenStore};

/// How often the stored token is re-checked while signed in.
pub const CHECK_INTERVAL_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Login failed: {0}")]
    Login(#[from] AuthError),

    /// The server accepted the credentials but sent no token field.
    #[error("Login succeeded but no authentication token was received")]
    MissingToken,

    #[error("Failed to persist session: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub check_interval: Duration,
    /// Tokens this close to expiry are re-verified by the periodic check.
    pub refresh_leeway_secs: i64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(CHECK_INTERVAL_SECS),
            refresh_leeway_secs: token::EXPIRING_SOON_LEEWAY_SECS,
        }
    }
}

struct Inner {
    store: TokenStore,
    auth: AuthClient,
    options: SessionOptions,
    state: watch::Sender<Session>,
    timer: TimerSlot,
}

/// Owns the session for one application instance.
///
/// Create it once at startup, call `initialize`, and hand `subscribe()`
/// receivers to whatever needs to react to sign-in state. Dropping the
/// controller stops the background expiry check.
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(store: TokenStore, auth: AuthClient, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(Session::uninitialized());
        Self {
            inner: Arc::new(Inner {
                store,
                auth,
                options,
                state,
                timer: Mutex::new(None),
            }),
        }
    }

    /// Controller using the gateway's store for persistence and the gateway
    /// itself for auth calls.
    pub fn from_gateway(gateway: HttpGateway, options: SessionOptions) -> Self {
        let store = gateway.store().clone();
        Self::new(store, AuthClient::new(gateway), options)
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase
    }

    /// Restore the session from the token store.
    pub async fn initialize(&self) -> SessionPhase {
        let phase = self.inner.initialize().await;
        if phase == SessionPhase::Authenticated {
            self.start_timer();
        }
        phase
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.inner.login(email, password).await?;
        self.start_timer();
        Ok(())
    }

    /// Always succeeds: the store is cleared and the session ends whatever
    /// state it was in.
    pub fn logout(&self) {
        self.inner.logout();
    }

    /// Re-verify the stored token with the server. This does not obtain a
    /// new token.
    pub async fn refresh_token(&self) -> bool {
        self.inner.refresh_token().await
    }

    /// One run of the periodic check. Exposed so callers can force it.
    pub async fn check_expiry(&self) {
        self.inner.check_expiry().await;
    }

    pub fn clear_error(&self) {
        self.inner.state.send_modify(|s| s.error = None);
    }

    fn start_timer(&self) {
        let mut timer = lock_timer(&self.inner.timer);
        if timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let period = self.inner.options.check_interval;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        debug!(period_secs = period.as_secs_f64(), "Starting session expiry check");

        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.state.borrow().is_authenticated() {
                    break;
                }
                inner.check_expiry().await;
            }
            debug!("Session expiry check stopped");
        }));
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.inner.stop_timer();
    }
}

type TimerSlot = Mutex<Option<JoinHandle<()>>>;

fn lock_timer(timer: &TimerSlot) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn publish(&self, session: Session) {
        info!(phase = ?session.phase, has_user = session.user.is_some(), "Session state changed");
        self.state.send_replace(session);
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear stored session");
        }
    }

    fn stop_timer(&self) {
        if let Some(handle) = lock_timer(&self.timer).take() {
            handle.abort();
        }
    }

    async fn initialize(&self) -> SessionPhase {
        self.state.send_modify(|s| s.phase = SessionPhase::Loading);

        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Could not read stored session");
                Default::default()
            }
        };

        let Some(stored_token) = stored.token else {
            debug!("No stored token");
            self.publish(Session::unauthenticated());
            return SessionPhase::Unauthenticated;
        };

        if token::is_expired(&stored_token, token::HARD_EXPIRY_LEEWAY_SECS) {
            info!("Stored token expired locally, clearing");
            self.clear_store();
            self.publish(Session::unauthenticated());
            return SessionPhase::Unauthenticated;
        }

        if !self.auth.verify(&stored_token).await {
            info!("Stored token rejected by server, clearing");
            self.clear_store();
            self.publish(Session::unauthenticated());
            return SessionPhase::Unauthenticated;
        }

        let user = self.fetch_user(&stored_token).await;
        self.publish(Session::authenticated(stored_token, user));
        SessionPhase::Authenticated
    }

    /// Best-effort profile fetch; failures are logged, never propagated.
    async fn fetch_user(&self, token: &str) -> Option<crate::models::UserProfile> {
        match self.auth.current_user(token).await {
            Ok(user) => {
                if let Err(e) = self.store.save_user(&user) {
                    warn!(error = %e, "Could not cache user profile");
                }
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "Could not fetch current user; continuing without profile");
                None
            }
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let previous = self.state.borrow().clone();
        self.state.send_modify(|s| {
            s.phase = SessionPhase::Loading;
            s.error = None;
        });

        let result = match self.auth.login(email, password).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Login rejected");
                self.publish(Session {
                    error: Some(e.message().to_string()),
                    ..Session::unauthenticated()
                });
                return Err(SessionError::Login(e));
            }
        };

        let Some(new_token) = result.token else {
            warn!("Login response had neither access_token nor token; session unchanged");
            self.state.send_replace(previous);
            return Err(SessionError::MissingToken);
        };

        if let Err(e) = self.store.save_token(&new_token) {
            error!(error = %e, "Could not persist token");
            self.publish(Session {
                error: Some(e.to_string()),
                ..Session::unauthenticated()
            });
            return Err(e.into());
        }

        let user = match self.fetch_user(&new_token).await {
            Some(user) => Some(user),
            None => result.user,
        };
        self.publish(Session::authenticated(new_token, user));
        Ok(())
    }

    fn logout(&self) {
        info!("Logging out");
        self.stop_timer();
        self.clear_store();
        self.publish(Session::unauthenticated());
    }

    async fn refresh_token(&self) -> bool {
        let current = match self.store.token() {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Could not read stored token");
                return false;
            }
        };

        let valid = self.auth.verify(&current).await;
        debug!(valid, "Re-verified stored token");
        valid
    }

    async fn check_expiry(&self) {
        if !self.state.borrow().is_authenticated() {
            return;
        }

        let stored = match self.store.token() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Could not read stored token; skipping check");
                return;
            }
        };

        let Some(stored) = stored else {
            info!("Stored token is gone, ending session");
            self.logout();
            return;
        };

        if token::is_expired(&stored, self.options.refresh_leeway_secs) {
            info!("Token expiring soon, re-verifying");
            if !self.refresh_token().await {
                info!("Token could not be re-verified, logging out");
                self.logout();
            }
        }
    }
}
