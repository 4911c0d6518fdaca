//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::Notify;

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::auth::token::encode_claims;
use crate::auth::{AuthBackend, AuthGrant, SessionError, UserProfile};
use crate::routing::Navigator;

pub(crate) fn profile(username: &str, require_password_change: bool) -> UserProfile {
    UserProfile {
        id: "42".to_string(),
        uid: format!("usr-{}", username),
        username: username.to_string(),
        name: "Alice Admin".to_string(),
        email: format!("{}@example.com", username),
        require_password_change,
        roles: vec!["ADMIN".to_string()],
    }
}

type Responder = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Transport that answers from a queue (or a responder) and records every
/// request it sees. Yields once per call so concurrent callers interleave.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    queue: Mutex<VecDeque<ApiResponse>>,
    responder: Mutex<Option<Responder>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, status: StatusCode, body: &str) {
        self.queue.lock().unwrap().push_back(ApiResponse::new(status, body));
    }

    pub(crate) fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;

        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            return Ok(response);
        }
        match self.responder.lock().unwrap().as_ref() {
            Some(responder) => Ok(responder(&request)),
            None => Err(ApiError::InvalidResponse(format!("No scripted response for {}", request.path))),
        }
    }
}

/// In-process backend: accepts password "correct", counts refreshes, and
/// can be told to reject or stall them.
pub(crate) struct FakeBackend {
    profile: UserProfile,
    token_lifetime_secs: i64,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    reject_refresh: AtomicBool,
    hold: Mutex<Option<Arc<Notify>>>,
    refresh_started: Notify,
}

impl FakeBackend {
    pub(crate) fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            token_lifetime_secs: 3600,
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            reject_refresh: AtomicBool::new(false),
            hold: Mutex::new(None),
            refresh_started: Notify::new(),
        }
    }

    pub(crate) fn with_token_lifetime(mut self, seconds: i64) -> Self {
        self.token_lifetime_secs = seconds;
        self
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reject_refresh(&self) {
        self.reject_refresh.store(true, Ordering::SeqCst);
    }

    /// Make the next refresh wait until the returned handle is notified.
    pub(crate) fn hold_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) async fn wait_for_refresh_started(&self) {
        self.refresh_started.notified().await;
    }

    fn grant(&self) -> AuthGrant {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let exp = Utc::now().timestamp() + self.token_lifetime_secs;
        AuthGrant {
            access_token: encode_claims(&serde_json::json!({"exp": exp, "jti": format!("access-{}", n)})),
            refresh_token: format!("refresh-{}", n),
            profile: self.profile.clone(),
        }
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, username: &str, password: &str) -> Result<AuthGrant, SessionError> {
        if username != self.profile.username || password != "correct" {
            return Err(SessionError::InvalidCredentials("Invalid username or password".to_string()));
        }
        Ok(self.grant())
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<AuthGrant, SessionError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_started.notify_one();

        let hold = self.hold.lock().unwrap().take();
        if let Some(gate) = hold {
            gate.notified().await;
        }
        tokio::task::yield_now().await;

        if self.reject_refresh.load(Ordering::SeqCst) {
            return Err(SessionError::RefreshRejected("Refresh token expired".to_string()));
        }
        Ok(self.grant())
    }
}

/// Navigator that remembers where it was sent.
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}
