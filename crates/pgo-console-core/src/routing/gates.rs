use std::sync::Arc;

use tracing::debug;

use super::table::{self, RouteMatch, DEFAULT_ROUTE, LOGIN_ROUTE, PASSWORD_CHANGE_ROUTE};
use crate::auth::SessionManager;

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(&'static str),
}

/// Receives the redirects the session layer decides on.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// A check that may veto a navigation to `target`.
pub trait RouteGate: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, session: &SessionManager, target: &str) -> Navigation;
}

/// Requires a stored, unexpired access token.
pub struct AuthGate;

impl RouteGate for AuthGate {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn check(&self, session: &SessionManager, _target: &str) -> Navigation {
        if session.is_authenticated() {
            Navigation::Allow
        } else {
            Navigation::Redirect(LOGIN_ROUTE)
        }
    }
}

/// Keeps accounts that must change their password on the password-change
/// view, and everyone else off it.
pub struct PasswordChangeGate;

impl RouteGate for PasswordChangeGate {
    fn name(&self) -> &'static str {
        "password-change"
    }

    fn check(&self, session: &SessionManager, target: &str) -> Navigation {
        let required = session
            .current_profile()
            .map(|p| p.require_password_change)
            .unwrap_or(false);
        let on_password_change = target == PASSWORD_CHANGE_ROUTE;

        match (required, on_password_change) {
            (true, true) => Navigation::Allow,
            (true, false) => Navigation::Redirect(PASSWORD_CHANGE_ROUTE),
            (false, true) => Navigation::Redirect(DEFAULT_ROUTE),
            (false, false) => Navigation::Allow,
        }
    }
}

/// Upper bound on redirect hops for one navigation
const MAX_REDIRECTS: usize = 8;

/// Runs the gates in order before a navigation completes.
pub struct RouteGuard {
    session: Arc<SessionManager>,
    gates: Vec<Box<dyn RouteGate>>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionManager>, gates: Vec<Box<dyn RouteGate>>) -> Self {
        Self { session, gates }
    }

    /// Auth gate first, since the password-change gate needs a profile.
    pub fn standard(session: Arc<SessionManager>) -> Self {
        let gates: Vec<Box<dyn RouteGate>> = vec![Box::new(AuthGate), Box::new(PasswordChangeGate)];
        Self::new(session, gates)
    }

    /// Evaluate the gates for a protected target; the first veto wins.
    pub fn check(&self, target: &str) -> Navigation {
        for gate in &self.gates {
            if let Navigation::Redirect(to) = gate.check(&self.session, target) {
                debug!(gate = gate.name(), route = target, redirect = to, "Navigation vetoed");
                return Navigation::Redirect(to);
            }
        }
        Navigation::Allow
    }

    /// Follow route-table and gate redirects until a route is allowed, and
    /// return where the navigation ends up.
    pub fn resolve(&self, target: &str) -> String {
        let mut current = table::normalize(target);
        for _ in 0..MAX_REDIRECTS {
            let next = match table::resolve(&current) {
                RouteMatch::Public(path) => return path,
                RouteMatch::Redirect(to) => to,
                RouteMatch::Protected(path) => match self.check(&path) {
                    Navigation::Allow => return path,
                    Navigation::Redirect(to) => to,
                },
            };
            current = next.to_string();
        }
        LOGIN_ROUTE.to_string()
    }

    /// Resolve `target` and hand the destination to the navigator.
    pub fn navigate(&self, target: &str, navigator: &dyn Navigator) -> String {
        let destination = self.resolve(target);
        navigator.navigate(&destination);
        destination
    }
}
