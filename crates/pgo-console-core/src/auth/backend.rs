//! Strategies for exchanging credentials and refresh tokens for a grant.
//!
//! The session manager only sees the `AuthBackend` trait. Which
//! implementation it gets is decided once, from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{token, SessionError, UserProfile};
use crate::api::{ApiEnvelope, ApiError, ApiRequest, ApiResponse, Transport};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Header carrying the refresh token on the refresh call
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Tokens and identity handed out by a successful login or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub profile: UserProfile,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<AuthGrant, SessionError>;
    async fn refresh(&self, refresh_token: &str) -> Result<AuthGrant, SessionError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantData {
    token: String,
    refresh_token: String,
    #[serde(flatten)]
    profile: UserProfile,
}

impl From<GrantData> for AuthGrant {
    fn from(data: GrantData) -> Self {
        AuthGrant {
            access_token: data.token,
            refresh_token: data.refresh_token,
            profile: data.profile,
        }
    }
}

/// Talks to `/auth/login` and `/auth/refresh` on the real backend.
pub struct HttpAuthBackend {
    transport: Arc<dyn Transport>,
}

impl HttpAuthBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Decode a grant envelope; `rejected` builds the error for refusals.
    fn parse_grant(
        response: ApiResponse,
        rejected: fn(String) -> SessionError,
    ) -> Result<AuthGrant, SessionError> {
        match response.status {
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(rejected(ApiError::message_from_body(&response.body)));
            }
            _ => return Err(ApiError::from_status(response.status, &response.body).into()),
        }

        let envelope: ApiEnvelope<GrantData> = response.json()?;
        envelope.into_data().map(AuthGrant::from).map_err(rejected)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, username: &str, password: &str) -> Result<AuthGrant, SessionError> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest { username, password })?;
        let response = self.transport.send(request).await?;
        Self::parse_grant(response, SessionError::InvalidCredentials)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthGrant, SessionError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&serde_json::json!({}))?
            .header(REFRESH_TOKEN_HEADER, refresh_token)?;
        let response = self.transport.send(request).await?;
        Self::parse_grant(response, SessionError::RefreshRejected)
    }
}

/// Issuer stamped into tokens minted by the development backend
const DEV_ISSUER: &str = "pgo-console-dev";

/// Lifetime of development tokens
const DEV_TOKEN_HOURS: i64 = 24;

/// Offline backend for local development. Accepts a single configured
/// account and mints unsigned tokens for it; never touches the network.
pub struct DevAuthBackend {
    username: String,
    password: String,
}

impl DevAuthBackend {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn mint_token(&self, kind: &str) -> String {
        let now = Utc::now();
        let claims = serde_json::json!({
            "iss": DEV_ISSUER,
            "sub": self.username,
            "kind": kind,
            "iat": now.timestamp(),
            "exp": (now + Duration::hours(DEV_TOKEN_HOURS)).timestamp(),
            "roles": ["ADMIN", "USER"],
        });
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signature = URL_SAFE_NO_PAD.encode("dev-signature");
        format!("{}.{}.{}", header, payload, signature)
    }

    fn is_own_refresh_token(token: &str) -> bool {
        let Some(payload) = token.split('.').nth(1) else {
            return false;
        };
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) else {
            return false;
        };
        let Ok(claims) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            return false;
        };
        claims.get("iss").and_then(|v| v.as_str()) == Some(DEV_ISSUER)
            && claims.get("kind").and_then(|v| v.as_str()) == Some("refresh")
    }

    fn grant(&self) -> AuthGrant {
        AuthGrant {
            access_token: self.mint_token("access"),
            refresh_token: self.mint_token("refresh"),
            profile: UserProfile {
                id: "dev-user-1".to_string(),
                uid: "dev-uid-1".to_string(),
                username: self.username.clone(),
                name: "Development User".to_string(),
                email: "dev@example.com".to_string(),
                require_password_change: false,
                roles: vec!["ADMIN".to_string(), "USER".to_string()],
            },
        }
    }
}

#[async_trait]
impl AuthBackend for DevAuthBackend {
    async fn login(&self, username: &str, password: &str) -> Result<AuthGrant, SessionError> {
        if username != self.username || password != self.password {
            return Err(SessionError::InvalidCredentials(
                "Development backend only accepts the configured account".to_string(),
            ));
        }
        debug!(username, "Issuing development login");
        Ok(self.grant())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthGrant, SessionError> {
        if !Self::is_own_refresh_token(refresh_token) || token::is_expired(refresh_token) {
            return Err(SessionError::RefreshRejected(
                "Refresh token was not issued by the development backend".to_string(),
            ));
        }
        Ok(self.grant())
    }
}
