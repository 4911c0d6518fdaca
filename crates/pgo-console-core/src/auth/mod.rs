//! Authentication module for the console session.
//!
//! This module provides:
//! - `CredentialStore`: the three persisted session slots
//! - `SessionManager`: login, logout, refresh and the profile change stream
//! - `AuthBackend`: the HTTP and development strategies for obtaining grants
//!
//! Access tokens are inspected offline; see `token`.

pub mod backend;
pub mod credentials;
pub mod error;
pub mod profile;
pub mod session;
pub mod token;

pub use backend::{AuthBackend, AuthGrant, DevAuthBackend, HttpAuthBackend};
pub use credentials::{CredentialStore, FileStore, KeyValueStore, KeyringStore, MemoryStore, Slot};
pub use error::SessionError;
pub use profile::{ProfilePatch, UserProfile};
pub use session::{RefreshFailure, SessionManager, SessionStatus};
