//! services/api/src/web/auth.rs
//!
//! Sign-in endpoints: provider discovery, the OAuth redirect and callback,
//! session retrieval, and sign-out.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::auth::{read_cookie, CALLBACK_COOKIE, ERROR_PAGE, SESSION_COOKIE, STATE_COOKIE};
use crate::web::state::AppState;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize)]
pub struct SignInQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// A 302 redirect that also sets the given cookies.
fn redirect(location: &str, cookies: Vec<String>) -> Response {
    let mut response = (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response();
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Dropping unencodable cookie: {}", e),
        }
    }
    response
}

fn error_redirect(state: &AppState, error: &str, clear: Vec<String>) -> Response {
    let location = format!("{}{}?error={}", state.auth.settings().base_url, ERROR_PAGE, error);
    redirect(&location, clear)
}

fn known_provider(state: &AppState, provider: &str) -> bool {
    state.auth.provider().id() == provider
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/auth/providers - The configured identity providers
pub async fn providers_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let provider = state.auth.provider();
    let mut providers = serde_json::Map::new();
    providers.insert(
        provider.id().to_string(),
        json!({
            "id": provider.id(),
            "name": provider.name(),
            "type": "oauth",
            "signinUrl": state.auth.signin_url(),
            "callbackUrl": state.auth.redirect_uri(),
        }),
    );
    Json(serde_json::Value::Object(providers))
}

/// GET /api/auth/signin/{provider} - Send the browser to the identity provider
pub async fn signin_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<SignInQuery>,
) -> Response {
    if !known_provider(&state, &provider) {
        warn!("Sign-in requested for unknown provider {}", provider);
        return error_redirect(&state, "Configuration", Vec::new());
    }

    match state.auth.begin_sign_in(query.callback_url.as_deref()) {
        Ok(start) => redirect(
            &start.authorization_url,
            vec![
                state.auth.state_cookie(&start.state),
                state.auth.callback_cookie(&start.callback_url),
            ],
        ),
        Err(e) => {
            error!("Failed to start sign-in: {:?}", e);
            error_redirect(&state, "Configuration", Vec::new())
        }
    }
}

/// GET /api/auth/callback/{provider} - Finish the OAuth code exchange
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    // The state and callback cookies are single-use whatever the outcome.
    let clear = || {
        vec![
            state.auth.clear_cookie(STATE_COOKIE),
            state.auth.clear_cookie(CALLBACK_COOKIE),
        ]
    };

    if !known_provider(&state, &provider) {
        warn!("Callback for unknown provider {}", provider);
        return error_redirect(&state, "Configuration", clear());
    }
    if let Some(reason) = &query.error {
        warn!("Provider refused sign-in: {}", reason);
        return error_redirect(&state, "AccessDenied", clear());
    }

    let expected_state = read_cookie(&headers, STATE_COOKIE);
    let code = match (query.code.as_deref(), query.state.as_deref(), expected_state) {
        (Some(code), Some(got), Some(expected)) if got == expected => code,
        _ => {
            warn!("OAuth callback rejected: missing code or state mismatch");
            return error_redirect(&state, "OAuthCallback", clear());
        }
    };

    match state.auth.complete_sign_in(code).await {
        Ok((_user, token)) => {
            let destination = state.auth.callback_url_from(&headers);
            let mut cookies = clear();
            cookies.push(state.auth.session_cookie(&token));
            redirect(&destination, cookies)
        }
        Err(e) => {
            error!("OAuth callback failed: {:?}", e);
            error_redirect(&state, "OAuthCallback", clear())
        }
    }
}

/// GET /api/auth/session - The current session, refreshed, or `{}`
pub async fn session_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(claims) = state.auth.current_claims(&headers) else {
        return Json(json!({})).into_response();
    };

    match state.auth.refresh(claims) {
        Ok((claims, token)) => {
            let session = state.auth.project(&claims);
            let mut response = Json(session).into_response();
            if let Ok(value) = HeaderValue::from_str(&state.auth.session_cookie(&token)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
        Err(e) => {
            error!("Failed to refresh session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// POST /api/auth/signout - Drop the session cookie
pub async fn signout_handler(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, state.auth.clear_cookie(SESSION_COOKIE))],
        Json(json!({ "url": "/" })),
    )
        .into_response()
}
