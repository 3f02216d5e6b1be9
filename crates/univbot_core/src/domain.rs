//! crates/univbot_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ports::PortError;

//=========================================================================================
// Users
//=========================================================================================

/// A registered user. `email` is the unique identity of the record.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub student_id: Option<String>,
    pub department: Option<String>,
    pub image: Option<String>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated, normalized user that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub student_id: Option<String>,
    pub department: Option<String>,
    pub image: Option<String>,
}

impl NewUser {
    /// Builds a new user from raw input.
    ///
    /// Returns `None` when either the email or the name is blank once trimmed.
    pub fn new(email: &str, name: &str) -> Option<Self> {
        let email = normalize_email(email);
        let name = name.trim().to_string();
        if email.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            email,
            name,
            student_id: None,
            department: None,
            image: None,
        })
    }

    pub fn with_student_id(mut self, student_id: Option<&str>) -> Self {
        self.student_id = trimmed(student_id);
        self
    }

    pub fn with_department(mut self, department: Option<&str>) -> Self {
        self.department = trimmed(department);
        self
    }

    pub fn with_image(mut self, image: Option<&str>) -> Self {
        self.image = trimmed(image);
        self
    }
}

/// Emails are stored trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

//=========================================================================================
// Chats
//=========================================================================================

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(PortError::Unexpected(format!("unknown chat role '{}'", other))),
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation thread. `messages` is kept in turn order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Starts an empty, active conversation.
    pub fn new(session_id: impl Into<String>, user_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_id: session_id.into(),
            messages: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a message after every existing one.
    pub fn push(&mut self, message: ChatMessage) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }
}

//=========================================================================================
// Identity provider records
//=========================================================================================

/// The profile an identity provider reports for the signed-in person.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// The provider's own identifier for the person.
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    pub image: Option<String>,
}

/// Credentials the provider issues when the authorization code is exchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Seconds since the UNIX epoch.
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

/// A provider account linked to a local user.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub tokens: ProviderTokens,
}

impl Account {
    pub fn link(
        user_id: Uuid,
        provider: &str,
        profile: &ProviderProfile,
        tokens: ProviderTokens,
    ) -> Self {
        Self {
            user_id,
            provider: provider.to_string(),
            provider_account_id: profile.id.clone(),
            tokens,
        }
    }
}
