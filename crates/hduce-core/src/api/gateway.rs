//! The single HTTP client every portal request goes through.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use super::ApiError;
use crate::auth::{token, TokenStore};

/// Where the application is sent when the session ends.
pub const LOGIN_PATH: &str = "/login";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Receives forced navigation when the gateway ends the session.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator for headless use: records the redirect in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        info!(path, "Navigation requested");
    }
}

/// Which bearer token a request carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// The token in the store, after a local expiry check.
    Stored,
    /// A specific token, sent as-is.
    Explicit(String),
    /// No Authorization header.
    Anonymous,
}

/// Clone is cheap - reqwest::Client and the store are shared.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            navigator,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Clear the stored session and send the user to the login page.
    fn end_session(&self, reason: &str) {
        warn!(reason, "Ending session");
        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear stored session");
        }
        self.navigator.navigate(LOGIN_PATH);
    }

    /// Token to attach for `credential`, or `ExpiredToken` if the stored one
    /// has run out.
    fn bearer_for(&self, credential: &Credential) -> Result<Option<String>, ApiError> {
        match credential {
            Credential::Anonymous => Ok(None),
            Credential::Explicit(token) => Ok(Some(token.clone())),
            Credential::Stored => match self.store.token()? {
                Some(stored) if token::is_expired(&stored, token::HARD_EXPIRY_LEEWAY_SECS) => {
                    self.end_session("stored token expired before send");
                    Err(ApiError::ExpiredToken)
                }
                stored => Ok(stored),
            },
        }
    }

    async fn dispatch(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> Result<Response, ApiError> {
        let request = match self.bearer_for(credential)? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        self.check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    /// A 401 from any endpoint ends the session.
    async fn check_response(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        if status == StatusCode::UNAUTHORIZED {
            self.end_session("server answered 401");
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), path = %url, "Request failed");
        Err(ApiError::from_status(status, &body))
    }

    async fn parse<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    /// Send a request without a body and return the raw response.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
    ) -> Result<Response, ApiError> {
        debug!(%method, path, "Sending request");
        let request = self.client.request(method, self.url(path));
        self.dispatch(request, credential).await
    }

    /// Send a JSON body and return the raw response.
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        credential: &Credential,
    ) -> Result<Response, ApiError> {
        debug!(%method, path, "Sending request");
        let request = self.client.request(method, self.url(path)).json(body);
        self.dispatch(request, credential).await
    }

    /// GET with the stored credential.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_with(path, &Credential::Stored).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        credential: &Credential,
    ) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, credential).await?;
        Self::parse(response, path).await
    }

    /// POST with the stored credential.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.post_with(path, body, &Credential::Stored).await
    }

    pub async fn post_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        credential: &Credential,
    ) -> Result<T, ApiError> {
        let response = self.send_json(Method::POST, path, body, credential).await?;
        Self::parse(response, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{gateway_for, sample_user, token_with_exp};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_stored_token_is_attached() {
        let server = MockServer::start().await;
        let token = token_with_exp(3600);

        Mock::given(method("GET"))
            .and(path("/api/doctors/"))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, navigator) = gateway_for(&server.uri());
        gateway.store().save_token(&token).unwrap();

        let doctors: Vec<serde_json::Value> = gateway.get("/api/doctors/").await.unwrap();
        assert!(doctors.is_empty());
        assert!(navigator.paths().is_empty());
    }

    #[tokio::test]
    async fn test_no_header_without_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server.uri());
        let _: serde_json::Value = gateway.get("/auth/health").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_expired_token_aborts_before_send() {
        let server = MockServer::start().await;
        let (gateway, navigator) = gateway_for(&server.uri());
        gateway.store().save(&token_with_exp(-1), &sample_user()).unwrap();

        let result: Result<serde_json::Value, _> = gateway.get("/api/appointments/").await;

        assert!(matches!(result, Err(ApiError::ExpiredToken)));
        assert_eq!(gateway.store().token().unwrap(), None);
        assert_eq!(gateway.store().user().unwrap(), None);
        assert_eq!(navigator.paths(), vec![LOGIN_PATH.to_string()]);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_response_ends_session_for_any_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/notifications/"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Token revoked"})),
            )
            .mount(&server)
            .await;

        let (gateway, navigator) = gateway_for(&server.uri());
        gateway.store().save(&token_with_exp(3600), &sample_user()).unwrap();

        let result: Result<serde_json::Value, _> = gateway.get("/api/notifications/").await;

        match result {
            Err(ApiError::Unauthorized(message)) => assert_eq!(message, "Token revoked"),
            other => panic!("expected Unauthorized, got {:?}", other),
        }
        assert_eq!(gateway.store().token().unwrap(), None);
        assert_eq!(navigator.paths(), vec![LOGIN_PATH.to_string()]);
    }

    #[tokio::test]
    async fn test_unauthorized_with_explicit_credential_also_ends_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/verify"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (gateway, navigator) = gateway_for(&server.uri());
        gateway.store().save_token(&token_with_exp(3600)).unwrap();

        let result = gateway
            .send(
                Method::GET,
                "/auth/verify",
                &Credential::Explicit("other".to_string()),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(gateway.store().token().unwrap(), None);
        assert_eq!(navigator.paths().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/doctors/"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"detail": "Service unavailable"})),
            )
            .mount(&server)
            .await;

        let (gateway, navigator) = gateway_for(&server.uri());
        let token = token_with_exp(3600);
        gateway.store().save_token(&token).unwrap();

        let result: Result<serde_json::Value, _> = gateway.get("/api/doctors/").await;

        assert!(matches!(result, Err(ApiError::ServerError(ref m)) if m == "Service unavailable"));
        assert_eq!(gateway.store().token().unwrap(), Some(token));
        assert!(navigator.paths().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/doctors/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let (gateway, _) = gateway_for(&server.uri());
        let result: Result<Vec<serde_json::Value>, _> = gateway.get("/api/doctors/").await;
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let gateway = HttpGateway::new(
            "http://localhost:8000/",
            TokenStore::in_memory(),
            Arc::new(LogNavigator),
        )
        .unwrap();
        assert_eq!(gateway.base_url(), "http://localhost:8000");
        assert_eq!(gateway.url("/auth/login"), "http://localhost:8000/auth/login");
    }
}
