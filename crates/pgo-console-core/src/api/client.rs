//! Typed API client for the PGO admin backend.
//!
//! All calls go through the `Interceptor`, so they carry the current bearer
//! token and survive one access-token expiry transparently.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use super::{ApiEnvelope, ApiError, ApiRequest, Interceptor};
use crate::auth::{ProfilePatch, SessionError, SessionManager};

/// Password change endpoint for the logged-in user
const CHANGE_PASSWORD_PATH: &str = "/admin/v1/users/change-password";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
    new_password_confirmation: &'a str,
}

/// Clone is cheap; clones share the interceptor.
#[derive(Clone)]
pub struct ApiClient {
    interceptor: Arc<Interceptor>,
}

impl ApiClient {
    pub fn new(interceptor: Arc<Interceptor>) -> Self {
        Self { interceptor }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.interceptor.session()
    }

    /// Unwrap the envelope of a successful response.
    fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T, SessionError> {
        let envelope: ApiEnvelope<T> = serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse envelope: {}", e)))?;
        envelope.into_data().map_err(SessionError::Rejected)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let response = self.interceptor.execute(ApiRequest::get(path)).await?;
        Self::unwrap_envelope(&response.body)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, SessionError> {
        let request = ApiRequest::post(path).json(body)?;
        let response = self.interceptor.execute(request).await?;
        Self::unwrap_envelope(&response.body)
    }

    /// Raw body of a GET, for callers that want to inspect it themselves.
    pub async fn get_raw(&self, path: &str) -> Result<String, SessionError> {
        Ok(self.interceptor.execute(ApiRequest::get(path)).await?.body)
    }

    /// Change the logged-in user's password. On success the cached profile
    /// no longer requires a password change.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        new_password_confirmation: &str,
    ) -> Result<(), SessionError> {
        let body = ChangePasswordRequest {
            current_password,
            new_password,
            new_password_confirmation,
        };
        let changed: bool = self.post(CHANGE_PASSWORD_PATH, &body).await?;
        if !changed {
            return Err(SessionError::Rejected("Password was not changed".to_string()));
        }

        self.session().update_profile(ProfilePatch::password_changed())?;
        info!("Password changed");
        Ok(())
    }
}
