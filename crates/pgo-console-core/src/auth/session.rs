use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::credentials::{CredentialStore, Slot};
use super::{token, AuthBackend, AuthGrant, ProfilePatch, SessionError, UserProfile};

/// Buffered profile updates per subscriber before it starts lagging
const PROFILE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
    Refreshing,
}

#[derive(Debug, Default)]
struct SessionState {
    profile: Option<UserProfile>,
    /// Advanced by every logout and login; grants started under an older
    /// generation are discarded.
    generation: u64,
    refreshing: bool,
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the refreshing flag when dropped, including when the refresh
/// future is cancelled mid-flight.
struct RefreshingFlag<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        lock(self.state).refreshing = false;
    }
}

/// A refresh on behalf of a rejected request that left no usable session.
#[derive(Debug)]
pub struct RefreshFailure {
    pub error: SessionError,
    /// Whether this call performed the resulting logout
    pub ended_session: bool,
}

impl RefreshFailure {
    fn untouched(error: SessionError) -> Self {
        Self {
            error,
            ended_session: false,
        }
    }
}

/// Owner of "who is logged in".
///
/// Reads and writes all three credential slots, and broadcasts every change
/// of the current profile to subscribers. Share it behind an `Arc`.
pub struct SessionManager {
    store: CredentialStore,
    backend: Arc<dyn AuthBackend>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<Option<UserProfile>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Create the manager and restore whatever session the store holds.
    ///
    /// A stored session is only restored when both the access token and a
    /// readable profile are present; anything partial is cleared.
    pub fn new(store: CredentialStore, backend: Arc<dyn AuthBackend>) -> Self {
        let (events, _) = broadcast::channel(PROFILE_CHANNEL_CAPACITY);

        let profile = match (store.get(Slot::AccessToken), store.profile()) {
            (Some(_), Some(profile)) => {
                debug!(username = %profile.username, "Restored stored session");
                Some(profile)
            }
            _ => {
                if let Err(e) = store.clear_all() {
                    warn!(error = %e, "Failed to clear partial session");
                }
                None
            }
        };

        Self {
            store,
            backend,
            state: Mutex::new(SessionState {
                profile,
                ..SessionState::default()
            }),
            events,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    /// Exchange credentials for a session.
    ///
    /// The store is only touched once the backend accepted the credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, SessionError> {
        let generation = self.generation();
        let grant = self.backend.login(username, password).await?;
        let profile = self.apply_grant(grant, generation, true)?;
        info!(username = %profile.username, "Logged in");
        Ok(profile)
    }

    /// Drop the session locally. Never fails; storage errors are logged.
    pub fn logout(&self) {
        let mut state = self.lock_state();
        self.clear_session(&mut state);
    }

    /// Log out, unless there is no session left to end. Returns whether this
    /// call did the logout; of several racing callers exactly one gets `true`.
    pub fn end_session(&self) -> bool {
        let mut state = self.lock_state();
        if !self.has_session_locked(&state) {
            debug!("Session already ended");
            return false;
        }
        self.clear_session(&mut state);
        true
    }

    fn clear_session(&self, state: &mut SessionState) {
        state.generation += 1;
        state.profile = None;
        if let Err(e) = self.store.clear_all() {
            warn!(error = %e, "Failed to clear stored credentials on logout");
        }
        let _ = self.events.send(None);
        info!("Logged out");
    }

    /// True when an access token is stored and has not expired. No network.
    pub fn is_authenticated(&self) -> bool {
        self.access_token()
            .map(|token| !token::is_expired(&token))
            .unwrap_or(false)
    }

    pub fn is_expired(token: &str) -> bool {
        token::is_expired(token)
    }

    pub fn state(&self) -> SessionStatus {
        if self.lock_state().refreshing {
            SessionStatus::Refreshing
        } else if self.is_authenticated() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Anonymous
        }
    }

    /// Exchange the stored refresh token for a new session.
    ///
    /// On failure the store is left as it was; deciding whether to log out is
    /// up to the caller.
    pub async fn refresh(&self) -> Result<UserProfile, SessionError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh on behalf of a request that was rejected while carrying
    /// `rejected`. If another caller already replaced that token while this
    /// one waited for the refresh lock, the new session is reused as is.
    ///
    /// A failed refresh ends the session before the refresh lock is
    /// released, so callers queued behind it never retry the same refresh
    /// token.
    pub async fn refresh_after_rejection(&self, rejected: Option<&str>) -> Result<UserProfile, RefreshFailure> {
        let _guard = self.refresh_lock.lock().await;

        match (self.access_token(), self.current_profile()) {
            (Some(current), Some(profile)) if rejected != Some(current.as_str()) => {
                debug!("Token already refreshed by a concurrent request");
                return Ok(profile);
            }
            (None, _) if rejected.is_some() => {
                debug!("Session ended while waiting to refresh");
                return Err(RefreshFailure::untouched(SessionError::SessionEnded));
            }
            _ => {}
        }

        match self.refresh_locked().await {
            Ok(profile) => Ok(profile),
            // A newer logout or login owns the session now
            Err(SessionError::SessionEnded) => Err(RefreshFailure::untouched(SessionError::SessionEnded)),
            Err(error) => {
                warn!(error = %error, "Refresh failed, ending session");
                let ended_session = self.end_session();
                Err(RefreshFailure { error, ended_session })
            }
        }
    }

    async fn refresh_locked(&self) -> Result<UserProfile, SessionError> {
        let refresh_token = self
            .store
            .get(Slot::RefreshToken)
            .ok_or(SessionError::NoRefreshToken)?;

        let generation = {
            let mut state = self.lock_state();
            state.refreshing = true;
            state.generation
        };
        let flag = RefreshingFlag { state: &self.state };
        let result = self.backend.refresh(&refresh_token).await;
        drop(flag);

        let profile = self.apply_grant(result?, generation, false)?;
        info!(username = %profile.username, "Session refreshed");
        Ok(profile)
    }

    /// Persist and publish a grant, unless the session changed underneath it.
    fn apply_grant(&self, grant: AuthGrant, generation: u64, new_login: bool) -> Result<UserProfile, SessionError> {
        let mut state = self.lock_state();
        if state.generation != generation {
            warn!("Discarding grant for a session that has since ended");
            return Err(SessionError::SessionEnded);
        }

        let encoded = CredentialStore::encode_profile(&grant.profile).map_err(SessionError::Storage)?;
        self.store
            .set_all(&[
                (Slot::AccessToken, grant.access_token.as_str()),
                (Slot::RefreshToken, grant.refresh_token.as_str()),
                (Slot::Profile, encoded.as_str()),
            ])
            .map_err(SessionError::Storage)?;

        if new_login {
            state.generation += 1;
        }
        state.profile = Some(grant.profile.clone());
        let _ = self.events.send(Some(grant.profile.clone()));
        Ok(grant.profile)
    }

    pub fn current_profile(&self) -> Option<UserProfile> {
        self.lock_state().profile.clone()
    }

    /// Merge a partial update into the current profile and re-publish it.
    /// Returns `None` when nobody is logged in.
    pub fn update_profile(&self, patch: ProfilePatch) -> Result<Option<UserProfile>, SessionError> {
        let mut state = self.lock_state();
        let Some(mut updated) = state.profile.clone() else {
            debug!("Ignoring profile update without a session");
            return Ok(None);
        };
        updated.apply(patch);

        let encoded = CredentialStore::encode_profile(&updated).map_err(SessionError::Storage)?;
        self.store.set(Slot::Profile, &encoded).map_err(SessionError::Storage)?;

        state.profile = Some(updated.clone());
        let _ = self.events.send(Some(updated.clone()));
        Ok(Some(updated))
    }

    /// Stream of profile changes; `None` means logged out.
    pub fn subscribe(&self) -> broadcast::Receiver<Option<UserProfile>> {
        self.events.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(Slot::AccessToken)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.store.get(Slot::RefreshToken).is_some()
    }

    /// Whether any trace of a session is stored or held in memory.
    pub fn has_session(&self) -> bool {
        let state = self.lock_state();
        self.has_session_locked(&state)
    }

    fn has_session_locked(&self, state: &SessionState) -> bool {
        state.profile.is_some() || Slot::ALL.iter().any(|slot| self.store.get(*slot).is_some())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.lock_state()
            .profile
            .as_ref()
            .map(|p| p.has_role(role))
            .unwrap_or(false)
    }
}
