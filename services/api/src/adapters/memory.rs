//! services/api/src/adapters/memory.rs
//!
//! An in-memory `DatabaseService` used by tests and local experiments.
//! It enforces the same uniqueness rules as the PostgreSQL schema.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use univbot_core::domain::{normalize_email, Account, Chat, ChatMessage, NewUser, User};
use univbot_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    accounts: Vec<Account>,
    chats: Vec<Chat>,
}

/// In-memory store. Insertion order doubles as creation order.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail as if the data store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored users with the given email.
    pub fn count_users_with_email(&self, email: &str) -> usize {
        let email = normalize_email(email);
        self.read()
            .map(|t| t.users.iter().filter(|u| u.email == email).count())
            .unwrap_or(0)
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.read().map(|t| t.accounts.clone()).unwrap_or_default()
    }

    fn check_available(&self) -> PortResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> PortResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.check_available()?;
        self.tables
            .read()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))
    }

    fn write(&self) -> PortResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.check_available()?;
        self.tables
            .write()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))
    }
}

fn chat_not_found(chat_id: Uuid) -> PortError {
    PortError::NotFound(format!("Chat {} not found", chat_id))
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn ping(&self) -> PortResult<()> {
        self.check_available()
    }

    async fn list_users(&self, limit: usize) -> PortResult<Vec<User>> {
        Ok(self.read()?.users.iter().take(limit).cloned().collect())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        Ok(self.read()?.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let email = normalize_email(email);
        Ok(self.read()?.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let mut tables = self.write()?;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(PortError::Conflict(format!("User {} already exists", user.email)));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            student_id: user.student_id,
            department: user.department,
            image: user.image,
            last_active: now,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn touch_last_active(&self, user_id: Uuid) -> PortResult<()> {
        let mut tables = self.write()?;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        let now = Utc::now();
        user.last_active = now;
        user.updated_at = now;
        Ok(())
    }

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> PortResult<Option<User>> {
        let tables = self.read()?;
        let user_id = tables
            .accounts
            .iter()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .map(|a| a.user_id);
        Ok(user_id.and_then(|id| tables.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn link_account(&self, account: Account) -> PortResult<()> {
        let mut tables = self.write()?;
        let existing = tables.accounts.iter_mut().find(|a| {
            a.provider == account.provider && a.provider_account_id == account.provider_account_id
        });
        match existing {
            Some(existing) => {
                let refresh_token = account
                    .tokens
                    .refresh_token
                    .clone()
                    .or_else(|| existing.tokens.refresh_token.clone());
                existing.tokens = account.tokens;
                existing.tokens.refresh_token = refresh_token;
            }
            None => tables.accounts.push(account),
        }
        Ok(())
    }

    async fn create_chat(&self, chat: Chat) -> PortResult<Chat> {
        self.write()?.chats.push(chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat> {
        self.read()?
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| chat_not_found(chat_id))
    }

    async fn find_chats_by_session(&self, session_id: &str) -> PortResult<Vec<Chat>> {
        let mut chats: Vec<Chat> = self
            .read()?
            .chats
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }

    async fn append_message(&self, chat_id: Uuid, message: ChatMessage) -> PortResult<()> {
        let mut tables = self.write()?;
        let chat = tables
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| chat_not_found(chat_id))?;
        chat.push(message);
        Ok(())
    }

    async fn set_chat_active(&self, chat_id: Uuid, is_active: bool) -> PortResult<()> {
        let mut tables = self.write()?;
        let chat = tables
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| chat_not_found(chat_id))?;
        chat.is_active = is_active;
        chat.updated_at = Utc::now();
        Ok(())
    }
}
