//! Session core for the PGO admin console.
//!
//! Owns everything between the console's views and the backend's REST API
//! that concerns who is logged in: credential persistence, login and
//! logout, silent token refresh on 401, and the navigation gates that keep
//! anonymous users and accounts with a pending password change in place.

pub mod api;
pub mod auth;
pub mod config;
pub mod routing;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, Interceptor};
pub use auth::{SessionError, SessionManager, SessionStatus, UserProfile};
pub use config::Config;
pub use routing::{Navigation, Navigator, RouteGuard};
