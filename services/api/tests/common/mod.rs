//! Common test utilities for API integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use api_lib::adapters::InMemoryStore;
use api_lib::auth::token::{encode_token, now_secs, SessionClaims};
use api_lib::config::Config;
use api_lib::web::{create_router, AppState};
use async_trait::async_trait;
use axum_test::TestServer;
use univbot_core::domain::{ProviderProfile, ProviderTokens};
use univbot_core::ports::{IdentityProvider, PortError, PortResult, ProviderSignIn};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const SESSION_COOKIE: &str = "univbot.session-token";
pub const STATE_COOKIE: &str = "univbot.state";
pub const CALLBACK_COOKIE: &str = "univbot.callback-url";

/// Identity provider double: each authorization code maps to a profile.
#[derive(Default)]
pub struct FakeProvider {
    profiles: Mutex<HashMap<String, ProviderProfile>>,
    exchanges: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the profile returned for `code`.
    pub fn issue_code(&self, code: &str, profile: ProviderProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(code.to_string(), profile);
    }

    pub fn exchanges(&self) -> Vec<String> {
        self.exchanges.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn name(&self) -> &str {
        "Google"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> PortResult<String> {
        Ok(format!(
            "https://idp.test/authorize?state={}&redirect_uri={}",
            state, redirect_uri
        ))
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> PortResult<ProviderSignIn> {
        self.exchanges.lock().unwrap().push(code.to_string());
        let profile = self
            .profiles
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or(PortError::Unauthorized)?;
        Ok(ProviderSignIn {
            tokens: ProviderTokens {
                access_token: Some(format!("access-{}", code)),
                refresh_token: Some(format!("refresh-{}", code)),
                expires_at: Some(now_secs() as i64 + 3600),
                token_type: Some("Bearer".to_string()),
                scope: Some("openid email profile".to_string()),
                id_token: None,
            },
            profile,
        })
    }
}

pub fn profile(id: &str, email: &str, name: &str) -> ProviderProfile {
    ProviderProfile {
        id: id.to_string(),
        email: email.to_string(),
        email_verified: true,
        name: name.to_string(),
        image: Some(format!("https://img.test/{}.png", id)),
    }
}

pub fn test_config() -> Config {
    let env: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://unused/univbot"),
        ("AUTH_SECRET", TEST_SECRET),
        ("GOOGLE_CLIENT_ID", "client-id"),
        ("GOOGLE_CLIENT_SECRET", "client-secret"),
        ("AUTH_URL", "http://localhost:3000"),
    ]);
    Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).expect("test config")
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<FakeProvider>,
}

/// Create a test server backed by the in-memory store and a fake provider
pub fn create_test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let state = Arc::new(AppState::new(
        store.clone(),
        provider.clone(),
        Arc::new(test_config()),
    ));
    let server = TestServer::new(create_router(state)).expect("Failed to create test server");
    TestApp {
        server,
        store,
        provider,
    }
}

/// A signed session token for the given identity, valid for an hour.
pub fn session_token(user_id: Option<&str>, email: &str, name: &str) -> String {
    let now = now_secs();
    let claims = SessionClaims {
        sub: user_id.unwrap_or(email).to_string(),
        name: Some(name.to_string()),
        email: Some(email.to_string()),
        picture: Some("https://img.test/avatar.png".to_string()),
        access_token: Some("provider-access-token".to_string()),
        user_id: user_id.map(str::to_string),
        iat: now,
        exp: now + 3600,
        jti: "test-jti".to_string(),
    };
    encode_token(&claims, TEST_SECRET).expect("sign token")
}

/// Runs the sign-in redirect and returns the state the server remembered.
pub async fn begin_sign_in(app: &TestApp, callback_url: Option<&str>) -> (String, Option<String>) {
    let mut request = app.server.get("/api/auth/signin/google");
    if let Some(url) = callback_url {
        request = request.add_query_param("callbackUrl", url);
    }
    let response = request.await;
    assert_eq!(response.status_code(), 302);
    let state = response
        .maybe_cookie(STATE_COOKIE)
        .expect("No state cookie")
        .value()
        .to_string();
    let callback = response
        .maybe_cookie(CALLBACK_COOKIE)
        .map(|c| c.value().to_string());
    (state, callback)
}

/// Completes a sign-in for `code` and returns the session cookie value.
pub async fn sign_in(app: &TestApp, code: &str) -> String {
    let (state, _) = begin_sign_in(app, None).await;
    let response = app
        .server
        .get("/api/auth/callback/google")
        .add_query_param("code", code)
        .add_query_param("state", &state)
        .add_cookie(cookie::Cookie::new(STATE_COOKIE, state.clone()))
        .await;
    assert_eq!(response.status_code(), 302);
    response
        .maybe_cookie(SESSION_COOKIE)
        .expect("No session cookie")
        .value()
        .to_string()
}
