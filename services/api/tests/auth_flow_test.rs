//! Tests for the OAuth sign-in flow and session endpoints

mod common;

use common::{
    begin_sign_in, create_test_app, profile, sign_in, CALLBACK_COOKIE, SESSION_COOKIE,
    STATE_COOKIE,
};
use serde_json::{json, Value};
use univbot_core::ports::DatabaseService;

fn location(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get("location")
        .expect("No location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Test: the providers endpoint describes the one configured provider
#[tokio::test]
async fn test_providers() {
    let app = create_test_app();

    let response = app.server.get("/api/auth/providers").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["google"]["id"], "google");
    assert_eq!(body["google"]["type"], "oauth");
    assert_eq!(
        body["google"]["callbackUrl"],
        "http://localhost:3000/api/auth/callback/google"
    );
}

/// Test: sign-in redirects to the provider with a state bound to a cookie
#[tokio::test]
async fn test_signin_redirects_to_provider() {
    let app = create_test_app();

    let response = app.server.get("/api/auth/signin/google").await;

    assert_eq!(response.status_code(), 302);
    let state = response.maybe_cookie(STATE_COOKIE).unwrap().value().to_string();
    let target = location(&response);
    assert!(target.starts_with("https://idp.test/authorize"));
    assert!(target.contains(&format!("state={}", state)));
}

/// Test: unknown providers are a configuration error
#[tokio::test]
async fn test_unknown_provider() {
    let app = create_test_app();

    let response = app.server.get("/api/auth/signin/github").await;

    assert_eq!(response.status_code(), 302);
    assert_eq!(
        location(&response),
        "http://localhost:3000/auth/error?error=Configuration"
    );
}

/// Test: first sign-in creates the user and links the provider account
#[tokio::test]
async fn test_first_sign_in_creates_user() {
    let app = create_test_app();
    app.provider
        .issue_code("code-1", profile("g-1", "Ada@Uni.edu", "Ada"));

    let token = sign_in(&app, "code-1").await;

    let user = app
        .store
        .get_user_by_email("ada@uni.edu")
        .await
        .unwrap()
        .expect("user created");
    assert_eq!(user.name, "Ada");
    assert_eq!(user.image.as_deref(), Some("https://img.test/g-1.png"));
    let accounts = app.store.accounts();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].user_id, user.id);
    assert_eq!(accounts[0].tokens.access_token.as_deref(), Some("access-code-1"));

    // The session carries the durable id and the provider access token.
    let response = app
        .server
        .get("/api/auth/session")
        .add_cookie(cookie::Cookie::new(SESSION_COOKIE, token.clone()))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["user"]["id"], user.id.to_string());
    assert_eq!(body["user"]["email"], "ada@uni.edu");
    assert_eq!(body["accessToken"], "access-code-1");
    assert!(response.maybe_cookie(SESSION_COOKIE).is_some());

    let response = app
        .server
        .get("/api/user/profile")
        .add_cookie(cookie::Cookie::new(SESSION_COOKIE, token))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["user"]["id"], user.id.to_string());
}

/// Test: signing in again reuses the same user
#[tokio::test]
async fn test_repeat_sign_in_reuses_user() {
    let app = create_test_app();
    app.provider.issue_code("first", profile("g-7", "grace@uni.edu", "Grace"));
    app.provider.issue_code("second", profile("g-7", "grace@uni.edu", "Grace"));

    sign_in(&app, "first").await;
    sign_in(&app, "second").await;

    assert_eq!(app.store.count_users_with_email("grace@uni.edu"), 1);
    let accounts = app.store.accounts();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].tokens.access_token.as_deref(), Some("access-second"));
}

/// Test: a registered user signing in with a verified email gets linked
#[tokio::test]
async fn test_registered_user_is_linked_by_verified_email() {
    let app = create_test_app();
    let response = app
        .server
        .post("/api/users")
        .json(&json!({ "email": "linus@uni.edu", "name": "Linus", "studentId": "S-9" }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    let registered_id = body["data"]["id"].as_str().unwrap().to_string();

    app.provider.issue_code("c", profile("g-9", "linus@uni.edu", "Linus T"));
    sign_in(&app, "c").await;

    assert_eq!(app.store.count_users_with_email("linus@uni.edu"), 1);
    assert_eq!(app.store.accounts()[0].user_id.to_string(), registered_id);
}

/// Test: an unverified provider email is not linked to an existing user
#[tokio::test]
async fn test_unverified_email_is_not_linked() {
    let app = create_test_app();
    app.server
        .post("/api/users")
        .json(&json!({ "email": "mallory@uni.edu", "name": "Mallory" }))
        .await;
    let mut unverified = profile("g-13", "mallory@uni.edu", "Not Mallory");
    unverified.email_verified = false;
    app.provider.issue_code("c", unverified);

    let (state, _) = begin_sign_in(&app, None).await;
    let response = app
        .server
        .get("/api/auth/callback/google")
        .add_query_param("code", "c")
        .add_query_param("state", &state)
        .add_cookie(cookie::Cookie::new(STATE_COOKIE, state.clone()))
        .await;

    assert_eq!(response.status_code(), 302);
    assert_eq!(
        location(&response),
        "http://localhost:3000/auth/error?error=OAuthCallback"
    );
    assert!(app.store.accounts().is_empty());
}

/// Test: a mismatched state is rejected before the code is exchanged
#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let app = create_test_app();
    app.provider.issue_code("code", profile("g-1", "ada@uni.edu", "Ada"));
    let (state, _) = begin_sign_in(&app, None).await;

    let response = app
        .server
        .get("/api/auth/callback/google")
        .add_query_param("code", "code")
        .add_query_param("state", "attacker-state")
        .add_cookie(cookie::Cookie::new(STATE_COOKIE, state))
        .await;

    assert_eq!(response.status_code(), 302);
    assert_eq!(
        location(&response),
        "http://localhost:3000/auth/error?error=OAuthCallback"
    );
    let session = response.maybe_cookie(SESSION_COOKIE);
    assert!(session.is_none());
    assert!(app.provider.exchanges().is_empty());
    assert_eq!(app.store.count_users_with_email("ada@uni.edu"), 0);
}

/// Test: a provider-side refusal maps to AccessDenied
#[tokio::test]
async fn test_provider_error_is_access_denied() {
    let app = create_test_app();

    let response = app
        .server
        .get("/api/auth/callback/google")
        .add_query_param("error", "access_denied")
        .await;

    assert_eq!(response.status_code(), 302);
    assert_eq!(
        location(&response),
        "http://localhost:3000/auth/error?error=AccessDenied"
    );
}

/// Test: a rejected code exchange never sets a session
#[tokio::test]
async fn test_failed_exchange_sets_no_session() {
    let app = create_test_app();
    let (state, _) = begin_sign_in(&app, None).await;

    let response = app
        .server
        .get("/api/auth/callback/google")
        .add_query_param("code", "unknown-code")
        .add_query_param("state", &state)
        .add_cookie(cookie::Cookie::new(STATE_COOKIE, state.clone()))
        .await;

    assert_eq!(response.status_code(), 302);
    assert!(location(&response).ends_with("error=OAuthCallback"));
    assert!(response.maybe_cookie(SESSION_COOKIE).is_none());
}

/// Test: the remembered callback URL is honoured after sign-in
#[tokio::test]
async fn test_callback_url_is_honoured() {
    let app = create_test_app();
    app.provider.issue_code("code", profile("g-1", "ada@uni.edu", "Ada"));
    let (state, callback) = begin_sign_in(&app, Some("/chat")).await;
    let callback = callback.expect("No callback cookie");
    assert_eq!(callback, "/chat");

    let response = app
        .server
        .get("/api/auth/callback/google")
        .add_query_param("code", "code")
        .add_query_param("state", &state)
        .add_cookie(cookie::Cookie::new(STATE_COOKIE, state.clone()))
        .add_cookie(cookie::Cookie::new(CALLBACK_COOKIE, callback))
        .await;

    assert_eq!(response.status_code(), 302);
    assert_eq!(location(&response), "/chat");
}

/// Test: off-site callback URLs are replaced by the root
#[tokio::test]
async fn test_offsite_callback_url_is_ignored() {
    let app = create_test_app();

    let (_, callback) = begin_sign_in(&app, Some("https://evil.test/steal")).await;

    assert_eq!(callback.as_deref(), Some("/"));
}

/// Test: the session endpoint is empty without a session
#[tokio::test]
async fn test_session_without_cookie_is_empty() {
    let app = create_test_app();

    let response = app.server.get("/api/auth/session").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body, json!({}));
}

/// Test: signing out clears the session cookie
#[tokio::test]
async fn test_signout_clears_cookie() {
    let app = create_test_app();

    let response = app.server.post("/api/auth/signout").await;

    assert_eq!(response.status_code(), 200);
    let cookie = response.maybe_cookie(SESSION_COOKIE).expect("No cleared cookie");
    assert_eq!(cookie.value(), "");
    let body: Value = response.json();
    assert_eq!(body["url"], "/");
}
