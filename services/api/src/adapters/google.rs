//! services/api/src/adapters/google.rs
//!
//! Google OAuth 2.0 / OpenID Connect adapter implementing `IdentityProvider`.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use univbot_core::domain::{ProviderProfile, ProviderTokens};
use univbot_core::ports::{IdentityProvider, PortError, PortResult, ProviderSignIn};
use url::Url;

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPE: &str = "openid email profile";

pub struct GoogleProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GoogleProvider {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

fn upstream(context: &str, e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", context, e))
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn name(&self) -> &str {
        "Google"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> PortResult<String> {
        let url = Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", SCOPE),
                ("state", state),
            ],
        )
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> PortResult<ProviderSignIn> {
        let token: TokenResponse = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| upstream("token exchange failed", e))?
            .json()
            .await
            .map_err(|e| upstream("invalid token response", e))?;

        let info: UserInfo = self
            .client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| upstream("userinfo request failed", e))?
            .json()
            .await
            .map_err(|e| upstream("invalid userinfo response", e))?;

        let email = info
            .email
            .ok_or_else(|| PortError::Unexpected("provider returned no email".to_string()))?;
        let name = info.name.unwrap_or_else(|| email.clone());

        Ok(ProviderSignIn {
            profile: ProviderProfile {
                id: info.sub,
                email,
                email_verified: info.email_verified,
                name,
                image: info.picture,
            },
            tokens: ProviderTokens {
                access_token: Some(token.access_token),
                refresh_token: token.refresh_token,
                expires_at: token.expires_in.map(|secs| Utc::now().timestamp() + secs),
                token_type: token.token_type,
                scope: token.scope,
                id_token: token.id_token,
            },
        })
    }
}
