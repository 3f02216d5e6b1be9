//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The pool is not opened at construction time. Every operation goes through a
//! [`ConnectionCache`], so the first request connects and every later request
//! reuses the same pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use univbot_core::connection::{ConnectionCache, Connector};
use univbot_core::domain::{normalize_email, Account, Chat, ChatMessage, NewUser, User};
use univbot_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

use crate::error::ApiError;

/// Upper bound on pooled connections.
const MAX_POOL_SIZE: u32 = 10;
/// How long to wait for a usable server before giving up.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Statements idle on the socket longer than this are cancelled by the server.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(45);
/// Idle pooled connections are closed after this long.
const MAX_IDLE_TIME: Duration = Duration::from_secs(30);

//=========================================================================================
// Connector
//=========================================================================================

/// Opens the PostgreSQL pool with the service's fixed pool settings.
pub struct PgConnector {
    database_url: String,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    async fn connect_options(&self) -> PortResult<PgConnectOptions> {
        let options = PgConnectOptions::from_str(&self.database_url)
            .map_err(|e| PortError::Unavailable(format!("invalid database url: {}", e)))?
            .options([("statement_timeout", SOCKET_TIMEOUT.as_millis().to_string())]);
        Ok(prefer_ipv4(options).await)
    }
}

/// Swaps a hostname for its first IPv4 address, when it has one.
async fn prefer_ipv4(options: PgConnectOptions) -> PgConnectOptions {
    let host = options.get_host().to_string();
    // Unix sockets and literal addresses are used as given.
    if host.starts_with('/') || host.parse::<IpAddr>().is_ok() {
        return options;
    }
    let resolved = tokio::net::lookup_host((host.as_str(), options.get_port())).await;
    match resolved {
        Ok(mut addrs) => match addrs.find(SocketAddr::is_ipv4) {
            Some(addr) => options.host(&addr.ip().to_string()),
            None => options,
        },
        Err(e) => {
            warn!("Could not resolve database host {}: {}", host, e);
            options
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgPool;

    async fn connect(&self) -> PortResult<PgPool> {
        let options = self.connect_options().await?;
        PgPoolOptions::new()
            .max_connections(MAX_POOL_SIZE)
            .acquire_timeout(SERVER_SELECTION_TIMEOUT)
            .idle_timeout(Some(MAX_IDLE_TIME))
            .connect_with(options)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    cache: Arc<ConnectionCache<PgConnector>>,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`. No connection is made until first use.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            cache: Arc::new(ConnectionCache::new(PgConnector::new(database_url))),
        }
    }

    async fn pool(&self) -> PortResult<PgPool> {
        self.cache.connect().await
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), ApiError> {
        let pool = self.pool().await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str =
    "id, email, name, student_id, department, image, last_active, created_at, updated_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    student_id: Option<String>,
    department: Option<String>,
    image: Option<String>,
    last_active: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            student_id: self.student_id,
            department: self.department,
            image: self.image,
            last_active: self.last_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    user_id: Option<Uuid>,
    session_id: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self, messages: Vec<ChatMessage>) -> Chat {
        Chat {
            id: self.id,
            user_id: self.user_id,
            session_id: self.session_id,
            messages,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    chat_id: Uuid,
    role: String,
    content: String,
    timestamp: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<ChatMessage> {
        Ok(ChatMessage {
            role: self.role.parse()?,
            content: self.content,
            timestamp: self.timestamp,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn ping(&self) -> PortResult<()> {
        let pool = self.pool().await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn list_users(&self, limit: usize) -> PortResult<Vec<User>> {
        let pool = self.pool().await?;
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC LIMIT $1",
            USER_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(UserRecord::to_domain).collect())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let pool = self.pool().await?;
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let pool = self.pool().await?;
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let pool = self.pool().await?;
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, email, name, student_id, department, image) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.student_id)
        .bind(&user.department)
        .bind(&user.image)
        .fetch_one(&pool)
        .await
        .map_err(|e| match e {
            // The unique index on email is the source of truth for duplicates.
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("User {} already exists", user.email))
            }
            e => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn touch_last_active(&self, user_id: Uuid) -> PortResult<()> {
        let pool = self.pool().await?;
        let result =
            sqlx::query("UPDATE users SET last_active = now(), updated_at = now() WHERE id = $1")
                .bind(user_id)
                .execute(&pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> PortResult<Option<User>> {
        let pool = self.pool().await?;
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.email, u.name, u.student_id, u.department, u.image, \
                    u.last_active, u.created_at, u.updated_at \
             FROM users u JOIN accounts a ON a.user_id = u.id \
             WHERE a.provider = $1 AND a.provider_account_id = $2",
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn link_account(&self, account: Account) -> PortResult<()> {
        let pool = self.pool().await?;
        let tokens = &account.tokens;
        sqlx::query(
            "INSERT INTO accounts (user_id, provider, provider_account_id, access_token, \
                                   refresh_token, expires_at, token_type, scope, id_token) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (provider, provider_account_id) DO UPDATE SET \
                access_token = EXCLUDED.access_token, \
                refresh_token = COALESCE(EXCLUDED.refresh_token, accounts.refresh_token), \
                expires_at = EXCLUDED.expires_at, \
                token_type = EXCLUDED.token_type, \
                scope = EXCLUDED.scope, \
                id_token = EXCLUDED.id_token, \
                updated_at = now()",
        )
        .bind(account.user_id)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at)
        .bind(&tokens.token_type)
        .bind(&tokens.scope)
        .bind(&tokens.id_token)
        .execute(&pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn create_chat(&self, chat: Chat) -> PortResult<Chat> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO chats (id, user_id, session_id, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(chat.id)
        .bind(chat.user_id)
        .bind(&chat.session_id)
        .bind(chat.is_active)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        for (position, message) in chat.messages.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chat_messages (chat_id, position, role, content, timestamp) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(chat.id)
            .bind(position as i32)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat> {
        let pool = self.pool().await?;
        let record = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, user_id, session_id, is_active, created_at, updated_at \
             FROM chats WHERE id = $1",
        )
        .bind(chat_id)
        .fetch_optional(&pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))?;

        let messages = sqlx::query_as::<_, MessageRecord>(
            "SELECT chat_id, role, content, timestamp FROM chat_messages \
             WHERE chat_id = $1 ORDER BY position ASC",
        )
        .bind(chat_id)
        .fetch_all(&pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(MessageRecord::to_domain)
        .collect::<PortResult<Vec<_>>>()?;

        Ok(record.to_domain(messages))
    }

    async fn find_chats_by_session(&self, session_id: &str) -> PortResult<Vec<Chat>> {
        let pool = self.pool().await?;
        let records = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, user_id, session_id, is_active, created_at, updated_at \
             FROM chats WHERE session_id = $1 ORDER BY created_at DESC",
        )
        .bind(session_id)
        .fetch_all(&pool)
        .await
        .map_err(unexpected)?;

        let chat_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut messages: HashMap<Uuid, Vec<ChatMessage>> = HashMap::new();
        let message_records = sqlx::query_as::<_, MessageRecord>(
            "SELECT chat_id, role, content, timestamp FROM chat_messages \
             WHERE chat_id = ANY($1) ORDER BY chat_id, position ASC",
        )
        .bind(&chat_ids)
        .fetch_all(&pool)
        .await
        .map_err(unexpected)?;
        for record in message_records {
            let chat_id = record.chat_id;
            messages.entry(chat_id).or_default().push(record.to_domain()?);
        }

        Ok(records
            .into_iter()
            .map(|r| {
                let chat_messages = messages.remove(&r.id).unwrap_or_default();
                r.to_domain(chat_messages)
            })
            .collect())
    }

    async fn append_message(&self, chat_id: Uuid, message: ChatMessage) -> PortResult<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(unexpected)?;

        // Lock the chat row so concurrent appends get consecutive positions.
        let locked = sqlx::query("SELECT id FROM chats WHERE id = $1 FOR UPDATE")
            .bind(chat_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?;
        if locked.is_none() {
            return Err(PortError::NotFound(format!("Chat {} not found", chat_id)));
        }

        sqlx::query(
            "INSERT INTO chat_messages (chat_id, position, role, content, timestamp) \
             VALUES ($1, \
                     (SELECT COALESCE(MAX(position) + 1, 0) FROM chat_messages WHERE chat_id = $1), \
                     $2, $3, $4)",
        )
        .bind(chat_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("UPDATE chats SET updated_at = now() WHERE id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn set_chat_active(&self, chat_id: Uuid, is_active: bool) -> PortResult<()> {
        let pool = self.pool().await?;
        let result =
            sqlx::query("UPDATE chats SET is_active = $1, updated_at = now() WHERE id = $2")
                .bind(is_active)
                .bind(chat_id)
                .execute(&pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chat {} not found", chat_id)));
        }
        Ok(())
    }
}
