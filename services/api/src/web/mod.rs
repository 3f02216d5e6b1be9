pub mod auth;
pub mod rest;
pub mod state;

pub use rest::{create_user_handler, list_users_handler, profile_handler, test_db_handler};
pub use state::AppState;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;

use auth::{
    callback_handler, providers_handler, session_handler, signin_handler, signout_handler,
};
use rest::ApiDoc;

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Builds the complete HTTP router for the service.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]),
        Err(e) => {
            warn!("Ignoring invalid CORS origin {}: {}", state.config.cors_origin, e);
            CorsLayer::new()
        }
    };

    // REST routes. The chat-completion endpoint is intentionally not routed.
    let api_routes = Router::new()
        .route("/api/test-db", get(test_db_handler))
        .route("/api/users", get(list_users_handler).post(create_user_handler))
        .route("/api/user/profile", get(profile_handler));

    let auth_routes = Router::new()
        .route("/api/auth/providers", get(providers_handler))
        .route("/api/auth/signin/{provider}", get(signin_handler))
        .route("/api/auth/callback/{provider}", get(callback_handler))
        .route("/api/auth/session", get(session_handler))
        .route("/api/auth/signout", post(signout_handler));

    Router::new()
        .merge(api_routes)
        .merge(auth_routes)
        .route("/api-docs/openapi.json", get(openapi_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
