//! crates/univbot_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or
//! identity providers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Account, Chat, ChatMessage, NewUser, ProviderProfile, ProviderTokens, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
///
/// `Clone` so that a single failed connection attempt can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Makes sure the data store is reachable, connecting if needed.
    async fn ping(&self) -> PortResult<()>;

    // --- User Management ---
    /// Returns at most `limit` users, oldest first.
    async fn list_users(&self, limit: usize) -> PortResult<Vec<User>>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>>;

    /// Looks a user up by email. The lookup is case-insensitive.
    async fn get_user_by_email(&self, email: &str) -> PortResult<Option<User>>;

    /// Inserts a user. Fails with `PortError::Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn touch_last_active(&self, user_id: Uuid) -> PortResult<()>;

    // --- Provider Accounts ---
    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> PortResult<Option<User>>;

    /// Links a provider account to a user. Re-linking the same account
    /// refreshes its stored tokens.
    async fn link_account(&self, account: Account) -> PortResult<()>;

    // --- Chats ---
    async fn create_chat(&self, chat: Chat) -> PortResult<Chat>;

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat>;

    /// Returns every chat for a session id, newest first.
    async fn find_chats_by_session(&self, session_id: &str) -> PortResult<Vec<Chat>>;

    async fn append_message(&self, chat_id: Uuid, message: ChatMessage) -> PortResult<()>;

    async fn set_chat_active(&self, chat_id: Uuid, is_active: bool) -> PortResult<()>;
}

/// The result of a successful authorization-code exchange.
#[derive(Debug, Clone)]
pub struct ProviderSignIn {
    pub profile: ProviderProfile,
    pub tokens: ProviderTokens,
}

/// An OAuth 2.0 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short identifier used in routes, e.g. `google`.
    fn id(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str;

    /// The URL the browser is sent to in order to start signing in.
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> PortResult<String>;

    /// Exchanges an authorization code for tokens and the person's profile.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> PortResult<ProviderSignIn>;
}
