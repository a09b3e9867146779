//! Authentication endpoints of the portal API.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{endpoints, ApiError, Credential, HttpGateway};
use crate::models::{Role, UserProfile};

/// A rejected or failed authentication call. Displays the server's own
/// message when it sent one.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct AuthError {
    message: String,
    #[source]
    source: ApiError,
}

impl AuthError {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn api_error(&self) -> &ApiError {
        &self.source
    }
}

impl From<ApiError> for AuthError {
    fn from(source: ApiError) -> Self {
        Self {
            message: source.user_message(),
            source,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Login body as sent by the auth service. Current builds answer with
/// `access_token`; older ones with `token`.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    user: Option<UserProfile>,
}

/// Outcome of a successful login call, with the token field normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    /// `access_token` if present, else the legacy `token`; `None` if the
    /// server sent neither.
    pub token: Option<String>,
    pub token_type: Option<String>,
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub user: Option<UserProfile>,
}

impl From<LoginResponse> for LoginResult {
    fn from(response: LoginResponse) -> Self {
        let non_empty = |t: Option<String>| t.filter(|t| !t.is_empty());
        let token = non_empty(response.access_token).or_else(|| non_empty(response.token));

        Self {
            token,
            token_type: response.token_type,
            user_id: response.user_id,
            email: response.email,
            role: response.role,
            user: response.user,
        }
    }
}

/// Clone is cheap - shares the gateway's connection pool and store.
#[derive(Clone)]
pub struct AuthClient {
    gateway: HttpGateway,
}

impl AuthClient {
    pub fn new(gateway: HttpGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &HttpGateway {
        &self.gateway
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, AuthError> {
        info!(email, "Logging in");
        let response: LoginResponse = self
            .gateway
            .post_with(
                endpoints::AUTH_LOGIN,
                &LoginRequest { email, password },
                &Credential::Anonymous,
            )
            .await?;

        let result = LoginResult::from(response);
        if result.token.is_none() {
            warn!(email, "Login response carried no token");
        }
        Ok(result)
    }

    /// Whether the server accepts `token`. Never fails: any error is `false`.
    pub async fn verify(&self, token: &str) -> bool {
        match self
            .gateway
            .send(
                reqwest::Method::GET,
                endpoints::AUTH_VERIFY,
                &Credential::Explicit(token.to_string()),
            )
            .await
        {
            Ok(_) => {
                debug!("Token verified");
                true
            }
            Err(e) => {
                debug!(error = %e, "Token verification failed");
                false
            }
        }
    }

    pub async fn current_user(&self, token: &str) -> Result<UserProfile, AuthError> {
        let user: UserProfile = self
            .gateway
            .get_with(endpoints::USERS_ME, &Credential::Explicit(token.to_string()))
            .await?;
        debug!(user_id = user.id, "Fetched current user");
        Ok(user)
    }

    /// Liveness probe of the auth service.
    pub async fn health(&self) -> bool {
        self.gateway
            .send(
                reqwest::Method::GET,
                endpoints::AUTH_HEALTH,
                &Credential::Anonymous,
            )
            .await
            .is_ok()
    }
}
