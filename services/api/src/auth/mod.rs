//! services/api/src/auth/mod.rs
//!
//! The authentication adapter: one OAuth identity provider, a database-backed
//! account store, and self-contained signed session tokens.
//!
//! Handlers never parse tokens themselves; they ask [`AuthService::get_session`]
//! and treat `None` as unauthenticated.

pub mod callbacks;
pub mod token;

use axum::http::{header, HeaderMap};
use std::sync::Arc;
use tracing::{debug, info};
use univbot_core::domain::{Account, NewUser, ProviderProfile, User};
use univbot_core::ports::{DatabaseService, IdentityProvider, PortError, PortResult};
use uuid::Uuid;

use crate::config::Config;
pub use callbacks::{Session, SessionUser};
use token::{decode_token, encode_token, now_secs, SessionClaims};

pub const SESSION_COOKIE: &str = "univbot.session-token";
pub const STATE_COOKIE: &str = "univbot.state";
pub const CALLBACK_COOKIE: &str = "univbot.callback-url";

/// How long the sign-in state and callback cookies live.
const STATE_MAX_AGE_SECS: u64 = 15 * 60;

pub const ERROR_PAGE: &str = "/auth/error";

/// Settings the authentication adapter needs from the service configuration.
#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub secret: String,
    /// Public base URL without a trailing slash.
    pub base_url: String,
    pub max_age_secs: u64,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secret: config.auth_secret.clone(),
            base_url: config.auth_url.clone(),
            max_age_secs: config.session_max_age_secs,
        }
    }

    fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

/// The first leg of a sign-in: where to send the browser, and the state to remember.
#[derive(Debug, Clone)]
pub struct SignInStart {
    pub authorization_url: String,
    pub state: String,
    pub callback_url: String,
}

pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    db: Arc<dyn DatabaseService>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        db: Arc<dyn DatabaseService>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            provider,
            db,
            settings,
        }
    }

    pub fn provider(&self) -> &dyn IdentityProvider {
        self.provider.as_ref()
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn signin_url(&self) -> String {
        format!("{}/api/auth/signin/{}", self.settings.base_url, self.provider.id())
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/api/auth/callback/{}", self.settings.base_url, self.provider.id())
    }

    //=====================================================================================
    // Session query
    //=====================================================================================

    /// The current session for a request, if it carries a valid token.
    pub fn get_session(&self, headers: &HeaderMap) -> Option<Session> {
        self.current_claims(headers).map(|claims| self.project(&claims))
    }

    /// Decodes the session cookie. Any failure counts as "no session".
    pub fn current_claims(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let raw = read_cookie(headers, SESSION_COOKIE)?;
        match decode_token(raw, &self.settings.secret) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!("Ignoring session cookie: {}", e);
                None
            }
        }
    }

    /// Runs the session hook over a token.
    pub fn project(&self, claims: &SessionClaims) -> Session {
        callbacks::session(Session::from_claims(claims), claims)
    }

    /// Re-issues an existing token with a fresh expiry.
    pub fn refresh(&self, claims: SessionClaims) -> PortResult<(SessionClaims, String)> {
        let mut claims = callbacks::jwt(claims, None, None);
        let now = now_secs();
        claims.iat = now;
        claims.exp = now + self.settings.max_age_secs;
        let token = self.sign(&claims)?;
        Ok((claims, token))
    }

    fn sign(&self, claims: &SessionClaims) -> PortResult<String> {
        encode_token(claims, &self.settings.secret).map_err(|e| PortError::Unexpected(e.to_string()))
    }

    //=====================================================================================
    // Sign-in flow
    //=====================================================================================

    /// Starts a sign-in. `callback_url` is where the browser lands afterwards.
    pub fn begin_sign_in(&self, callback_url: Option<&str>) -> PortResult<SignInStart> {
        let state = Uuid::new_v4().simple().to_string();
        let authorization_url = self
            .provider
            .authorization_url(&state, &self.redirect_uri())?;
        Ok(SignInStart {
            authorization_url,
            state,
            callback_url: self.safe_callback_url(callback_url),
        })
    }

    /// Finishes a sign-in: exchanges the code, resolves and links the local
    /// user, and returns a signed session token.
    pub async fn complete_sign_in(&self, code: &str) -> PortResult<(User, String)> {
        let signin = self
            .provider
            .exchange_code(code, &self.redirect_uri())
            .await?;
        let user = self.resolve_user(&signin.profile).await?;

        let account = Account::link(user.id, self.provider.id(), &signin.profile, signin.tokens);
        self.db.link_account(account.clone()).await?;
        self.db.touch_last_active(user.id).await?;

        let now = now_secs();
        let initial = SessionClaims {
            sub: user.id.to_string(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            picture: user.image.clone().or_else(|| signin.profile.image.clone()),
            access_token: None,
            user_id: None,
            iat: now,
            exp: now + self.settings.max_age_secs,
            jti: Uuid::new_v4().to_string(),
        };
        let claims = callbacks::jwt(initial, Some(&user), Some(&account));
        let token = self.sign(&claims)?;

        info!("User {} signed in with {}", user.id, self.provider.id());
        Ok((user, token))
    }

    /// Finds the local user for a provider profile, creating one on first sign-in.
    ///
    /// An existing user is linked by email only when the provider has verified
    /// that email.
    async fn resolve_user(&self, profile: &ProviderProfile) -> PortResult<User> {
        if let Some(user) = self
            .db
            .get_user_by_account(self.provider.id(), &profile.id)
            .await?
        {
            return Ok(user);
        }

        if let Some(user) = self.db.get_user_by_email(&profile.email).await? {
            return self.link_existing(user, profile);
        }

        let new_user = NewUser::new(&profile.email, &profile.name)
            .ok_or_else(|| PortError::Unexpected("provider profile lacks email or name".into()))?
            .with_image(profile.image.as_deref());
        match self.db.create_user(new_user).await {
            Ok(user) => {
                info!("Created user {} on first sign-in", user.id);
                Ok(user)
            }
            // Someone registered the same email in the meantime.
            Err(PortError::Conflict(_)) => match self.db.get_user_by_email(&profile.email).await? {
                Some(user) => self.link_existing(user, profile),
                None => Err(PortError::Unexpected("user vanished after conflict".into())),
            },
            Err(e) => Err(e),
        }
    }

    fn link_existing(&self, user: User, profile: &ProviderProfile) -> PortResult<User> {
        if profile.email_verified {
            Ok(user)
        } else {
            Err(PortError::Unauthorized)
        }
    }

    /// Only same-site destinations that fit in a cookie value are honoured.
    fn safe_callback_url(&self, callback_url: Option<&str>) -> String {
        let cookie_safe = |url: &&str| {
            !url.contains(|c: char| c == ';' || c == ',' || c == '"' || c.is_whitespace())
        };
        match callback_url.filter(cookie_safe) {
            Some(url) if url.starts_with('/') && !url.starts_with("//") => url.to_string(),
            Some(url)
                if url == self.settings.base_url
                    || url.starts_with(&format!("{}/", self.settings.base_url)) =>
            {
                url.to_string()
            }
            _ => "/".to_string(),
        }
    }

    /// Reads the remembered callback URL, falling back to `/`.
    pub fn callback_url_from(&self, headers: &HeaderMap) -> String {
        self.safe_callback_url(read_cookie(headers, CALLBACK_COOKIE))
    }

    //=====================================================================================
    // Cookies
    //=====================================================================================

    pub fn session_cookie(&self, token: &str) -> String {
        self.cookie(SESSION_COOKIE, token, self.settings.max_age_secs)
    }

    pub fn state_cookie(&self, state: &str) -> String {
        self.cookie(STATE_COOKIE, state, STATE_MAX_AGE_SECS)
    }

    pub fn callback_cookie(&self, callback_url: &str) -> String {
        self.cookie(CALLBACK_COOKIE, callback_url, STATE_MAX_AGE_SECS)
    }

    pub fn clear_cookie(&self, name: &str) -> String {
        self.cookie(name, "", 0)
    }

    fn cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        let secure = if self.settings.secure_cookies() {
            "; Secure"
        } else {
            ""
        };
        format!(
            "{}={}; HttpOnly{}; SameSite=Lax; Path=/; Max-Age={}",
            name, value, secure, max_age
        )
    }
}

/// Finds a cookie value in the request's `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (key, value) = c.trim().split_once('=')?;
            (key == name).then_some(value)
        })
        .filter(|v| !v.is_empty())
}
