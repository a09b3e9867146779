//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;

use crate::api::{HttpGateway, Navigator};
use crate::auth::TokenStore;
use crate::models::{Role, UserProfile};

/// Unsigned JWT carrying `claims`. Good enough for the client, which never
/// checks signatures.
pub(crate) fn token_with_claims(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

/// Token for user 7 expiring `secs_from_now` seconds from now.
pub(crate) fn token_with_exp(secs_from_now: i64) -> String {
    let now = Utc::now().timestamp();
    token_with_claims(serde_json::json!({
        "sub": "7",
        "email": "ana@hduce.test",
        "username": "ana",
        "user_id": 7,
        "iat": now - 60,
        "exp": now + secs_from_now,
    }))
}

pub(crate) fn sample_user() -> UserProfile {
    UserProfile {
        id: 7,
        email: "ana@hduce.test".to_string(),
        username: "ana".to_string(),
        name: Some("Ana Ruiz".to_string()),
        age: Some(34),
        role: Role::Patient,
        created_at: None,
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}

/// Gateway against `base_url` with an in-memory store.
pub(crate) fn gateway_for(base_url: &str) -> (HttpGateway, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let gateway = HttpGateway::new(base_url, TokenStore::in_memory(), navigator.clone())
        .expect("gateway builds");
    (gateway, navigator)
}
