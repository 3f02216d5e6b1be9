//! services/api/src/auth/callbacks.rs
//!
//! The two hooks that shape what a session carries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use univbot_core::domain::{Account, User};
use utoipa::ToSchema;

use super::token::SessionClaims;

/// The user part of a session, as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

/// The externally visible session.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Session {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Session {
    /// The default projection of a token before the session hook runs.
    pub fn from_claims(token: &SessionClaims) -> Self {
        let expires = DateTime::<Utc>::from_timestamp(token.exp as i64, 0).unwrap_or_default();
        Self {
            user: SessionUser {
                id: String::new(),
                name: token.name.clone(),
                email: token.email.clone(),
                image: token.picture.clone(),
            },
            expires,
            access_token: None,
        }
    }
}

/// Token-issuance hook.
///
/// Only the initial sign-in, where both the provider account and the user are
/// known, writes the provider access token and the user id into the token.
/// Every other call returns the token untouched.
pub fn jwt(
    mut token: SessionClaims,
    user: Option<&User>,
    account: Option<&Account>,
) -> SessionClaims {
    if let (Some(account), Some(user)) = (account, user) {
        token.access_token = account.tokens.access_token.clone();
        token.user_id = Some(user.id.to_string());
    }
    token
}

/// Session-projection hook.
///
/// `user.id` is the embedded user id, else the email, else empty.
pub fn session(mut session: Session, token: &SessionClaims) -> Session {
    session.access_token = token.access_token.clone();
    session.user.id = token
        .user_id
        .clone()
        .or_else(|| session.user.email.clone())
        .unwrap_or_default();
    session
}
