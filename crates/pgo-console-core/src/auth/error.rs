use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Login rejected: {0}")]
    InvalidCredentials(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Refresh token rejected: {0}")]
    RefreshRejected(String),

    #[error("Unauthorized - session is no longer valid")]
    Unauthorized,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Session ended while the request was in flight")]
    SessionEnded,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Credential storage failed: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => SessionError::Unauthorized,
            ApiError::AccessDenied(message) => SessionError::Forbidden(message),
            other => SessionError::Api(other),
        }
    }
}

impl SessionError {
    /// Errors after which the stored session can no longer be used.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            SessionError::NoRefreshToken | SessionError::RefreshRejected(_) | SessionError::Unauthorized
        )
    }
}
