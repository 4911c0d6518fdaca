use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, warn};

use super::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::auth::backend::{LOGIN_PATH, REFRESH_PATH};
use crate::auth::{SessionError, SessionManager};
use crate::routing::{Navigator, LOGIN_ROUTE};

/// Attaches credentials to outbound calls and recovers from an expired
/// access token with at most one refresh per call.
pub struct Interceptor {
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
}

impl Interceptor {
    pub fn new(session: Arc<SessionManager>, transport: Arc<dyn Transport>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            session,
            transport,
            navigator,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// The login and refresh calls must never carry a bearer token or
    /// trigger a refresh themselves.
    fn is_auth_endpoint(path: &str) -> bool {
        path.contains(LOGIN_PATH) || path.contains(REFRESH_PATH)
    }

    /// Dispatch a call. Only success responses come back as `Ok`.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        if Self::is_auth_endpoint(&request.path) {
            let response = self.transport.send(request).await?;
            return Ok(response.error_for_status()?);
        }

        let mut request = request;
        let sent_token = self.session.access_token();
        if let Some(ref token) = sent_token {
            request.set_bearer(token)?;
        }

        let response = self.transport.send(request.clone()).await?;
        match response.status {
            StatusCode::UNAUTHORIZED => self.retry_after_refresh(request, sent_token).await,
            StatusCode::FORBIDDEN => {
                warn!(path = %request.path, "Access denied: insufficient permissions");
                Err(ApiError::from_status(response.status, &response.body).into())
            }
            _ => Ok(response.error_for_status()?),
        }
    }

    async fn retry_after_refresh(
        &self,
        mut request: ApiRequest,
        sent_token: Option<String>,
    ) -> Result<ApiResponse, SessionError> {
        if let Err(failure) = self.session.refresh_after_rejection(sent_token.as_deref()).await {
            warn!(path = %request.path, error = %failure.error, "Token refresh failed");
            // Anonymous calls have no session to end but still belong on the login view
            if failure.ended_session || sent_token.is_none() {
                self.navigator.navigate(LOGIN_ROUTE);
            }
            return Err(match failure.error {
                SessionError::NoRefreshToken => SessionError::Unauthorized,
                other => other,
            });
        }

        let token = self.session.access_token().ok_or(SessionError::SessionEnded)?;
        request.set_bearer(&token)?;
        debug!(path = %request.path, "Retrying request with refreshed token");

        let response = self.transport.send(request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            warn!("Request rejected again after refresh");
            self.end_session();
            return Err(SessionError::Unauthorized);
        }
        Ok(response.error_for_status()?)
    }

    /// Log out and send the user to the login view, once per session.
    fn end_session(&self) {
        if self.session.end_session() {
            self.navigator.navigate(LOGIN_ROUTE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::token_expiring_in;
    use crate::auth::{CredentialStore, MemoryStore, Slot};
    use crate::testing::{profile, FakeBackend, RecordingNavigator, ScriptedTransport};
    use futures::future::join_all;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Fixture {
        backend: Arc<FakeBackend>,
        session: Arc<SessionManager>,
        transport: Arc<ScriptedTransport>,
        navigator: Arc<RecordingNavigator>,
        interceptor: Interceptor,
    }

    async fn fixture(logged_in: bool) -> Fixture {
        let backend = Arc::new(FakeBackend::new(profile("alice", false)));
        let session = Arc::new(SessionManager::new(CredentialStore::in_memory(), backend.clone()));
        if logged_in {
            session.login("alice", "correct").await.expect("login");
        }
        let transport = Arc::new(ScriptedTransport::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let interceptor = Interceptor::new(session.clone(), transport.clone(), navigator.clone());
        Fixture {
            backend,
            session,
            transport,
            navigator,
            interceptor,
        }
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let f = fixture(true).await;
        f.transport.push(StatusCode::OK, "{}");

        f.interceptor.execute(ApiRequest::get("/admin/v1/merchants")).await.expect("success");

        let sent = f.transport.requests();
        assert_eq!(sent[0].bearer().map(str::to_string), f.session.access_token());
    }

    #[tokio::test]
    async fn test_no_bearer_without_session() {
        let f = fixture(false).await;
        f.transport.push(StatusCode::OK, "{}");

        f.interceptor.execute(ApiRequest::get("/splash/options")).await.expect("success");
        assert_eq!(f.transport.requests()[0].bearer(), None);
    }

    #[tokio::test]
    async fn test_auth_endpoints_pass_through_untouched() {
        let f = fixture(true).await;
        f.transport.push(StatusCode::UNAUTHORIZED, "{}");

        let result = f.interceptor.execute(ApiRequest::post("/auth/login")).await;

        assert!(matches!(result, Err(SessionError::Unauthorized)));
        assert_eq!(f.transport.requests().len(), 1);
        assert_eq!(f.transport.requests()[0].bearer(), None);
        assert_eq!(f.backend.refresh_calls(), 0);
        assert!(f.session.is_authenticated());
        assert!(f.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_401_refreshes_and_retries_once() {
        let f = fixture(true).await;
        let old_token = f.session.access_token();
        f.transport.push(StatusCode::UNAUTHORIZED, "");
        f.transport.push(StatusCode::OK, r#"{"retried":true}"#);

        let response = f
            .interceptor
            .execute(ApiRequest::get("/admin/v1/transactions"))
            .await
            .expect("retried response");

        assert_eq!(response.body, r#"{"retried":true}"#);
        assert_eq!(f.backend.refresh_calls(), 1);
        let sent = f.transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].bearer().map(str::to_string), old_token);
        let new_token = f.session.access_token();
        assert_ne!(new_token, old_token);
        assert_eq!(sent[1].bearer().map(str::to_string), new_token);
        assert!(f.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_logs_out_once() {
        let f = fixture(true).await;
        f.backend.reject_refresh();
        let mut rx = f.session.subscribe();
        f.transport.push(StatusCode::UNAUTHORIZED, "");

        let result = f.interceptor.execute(ApiRequest::get("/admin/v1/users")).await;

        assert!(matches!(result, Err(SessionError::RefreshRejected(_))));
        assert_eq!(f.transport.requests().len(), 1);
        assert_eq!(rx.try_recv().expect("logout published"), None);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(f.navigator.routes(), vec![LOGIN_ROUTE]);
        assert!(!f.session.is_authenticated());
        assert!(!f.session.has_session());
    }

    #[tokio::test]
    async fn test_second_401_is_a_hard_failure() {
        let f = fixture(true).await;
        f.transport.push(StatusCode::UNAUTHORIZED, "");
        f.transport.push(StatusCode::UNAUTHORIZED, "");

        let result = f.interceptor.execute(ApiRequest::get("/admin/v1/users")).await;

        assert!(matches!(result, Err(SessionError::Unauthorized)));
        assert_eq!(f.backend.refresh_calls(), 1);
        assert_eq!(f.transport.requests().len(), 2);
        assert_eq!(f.navigator.routes(), vec![LOGIN_ROUTE]);
        assert!(!f.session.has_session());
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_logs_out() {
        // A session holding an access token but no refresh token
        let store = Arc::new(MemoryStore::new());
        let seed = CredentialStore::new(Box::new(store.clone()));
        seed.set(Slot::AccessToken, &token_expiring_in(600)).expect("seed token");
        let encoded = CredentialStore::encode_profile(&profile("alice", false)).expect("encode");
        seed.set(Slot::Profile, &encoded).expect("seed profile");

        let backend = Arc::new(FakeBackend::new(profile("alice", false)));
        let session = Arc::new(SessionManager::new(CredentialStore::new(Box::new(store.clone())), backend.clone()));
        assert!(session.is_authenticated());
        let transport = Arc::new(ScriptedTransport::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let interceptor = Interceptor::new(session.clone(), transport.clone(), navigator.clone());
        let mut rx = session.subscribe();
        transport.push(StatusCode::UNAUTHORIZED, "");

        let result = interceptor.execute(ApiRequest::get("/admin/v1/users")).await;

        assert!(matches!(result, Err(SessionError::Unauthorized)));
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(rx.try_recv().expect("logout published"), None);
        assert!(!session.has_session());
        assert_eq!(navigator.routes(), vec![LOGIN_ROUTE]);
    }

    #[tokio::test]
    async fn test_403_does_not_touch_session() {
        let f = fixture(true).await;
        f.transport.push(
            StatusCode::FORBIDDEN,
            r#"{"status":false,"statusCode":403,"message":"Missing permission MERCHANT_WRITE"}"#,
        );

        let result = f.interceptor.execute(ApiRequest::post("/admin/v1/merchants")).await;

        assert!(matches!(result, Err(SessionError::Forbidden(m)) if m == "Missing permission MERCHANT_WRITE"));
        assert_eq!(f.backend.refresh_calls(), 0);
        assert!(f.session.is_authenticated());
        assert!(f.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let f = fixture(true).await;
        f.transport.push(StatusCode::NOT_FOUND, "missing");

        let result = f.interceptor.execute(ApiRequest::get("/admin/v1/merchants/X")).await;

        assert!(matches!(result, Err(SessionError::Api(ApiError::NotFound(_)))));
        assert_eq!(f.backend.refresh_calls(), 0);
        assert!(f.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let f = fixture(true).await;
        let stale = f.session.access_token().expect("token");
        f.transport.respond_with(move |request| {
            if request.bearer() == Some(stale.as_str()) {
                ApiResponse::new(StatusCode::UNAUTHORIZED, "")
            } else {
                ApiResponse::new(StatusCode::OK, "ok")
            }
        });

        let calls = (0..4).map(|i| f.interceptor.execute(ApiRequest::get(format!("/admin/v1/page/{}", i))));
        let results = join_all(calls).await;

        for result in results {
            assert_eq!(result.expect("retried").body, "ok");
        }
        assert_eq!(f.backend.refresh_calls(), 1);
        assert_eq!(f.transport.requests().len(), 8);
        assert!(f.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_401s_with_failed_refresh_end_session_once() {
        let f = fixture(true).await;
        f.backend.reject_refresh();
        let mut rx = f.session.subscribe();
        f.transport.respond_with(|_| ApiResponse::new(StatusCode::UNAUTHORIZED, ""));

        let calls = (0..4).map(|i| f.interceptor.execute(ApiRequest::get(format!("/admin/v1/page/{}", i))));
        let results = join_all(calls).await;

        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(SessionError::RefreshRejected(_))))
                .count(),
            1
        );
        assert_eq!(f.backend.refresh_calls(), 1);
        assert_eq!(f.transport.requests().len(), 4);
        assert_eq!(rx.try_recv().expect("logout published"), None);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(f.navigator.routes(), vec![LOGIN_ROUTE]);
        assert!(!f.session.has_session());
    }

    #[tokio::test]
    async fn test_401_on_anonymous_request_redirects_to_login() {
        let f = fixture(false).await;
        let mut rx = f.session.subscribe();
        f.transport.push(StatusCode::UNAUTHORIZED, "");

        let result = f.interceptor.execute(ApiRequest::get("/admin/v1/users")).await;

        assert!(matches!(result, Err(SessionError::Unauthorized)));
        assert_eq!(f.backend.refresh_calls(), 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(f.navigator.routes(), vec![LOGIN_ROUTE]);
    }
}
