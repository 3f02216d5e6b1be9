//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::auth::{AuthService, AuthSettings};
use crate::config::Config;
use std::sync::Arc;
use univbot_core::ports::{DatabaseService, IdentityProvider};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub auth: Arc<AuthService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        provider: Arc<dyn IdentityProvider>,
        config: Arc<Config>,
    ) -> Self {
        let auth = AuthService::new(provider, db.clone(), AuthSettings::from_config(&config));
        Self {
            db,
            auth: Arc::new(auth),
            config,
        }
    }
}
