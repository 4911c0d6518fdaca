//! REST API plumbing for the PGO admin backend.
//!
//! Every call made on behalf of a logged-in user goes through the
//! `Interceptor`, which attaches the bearer token and recovers from an
//! expired access token with a single refresh. `ApiClient` adds typed
//! helpers on top.

pub mod client;
pub mod envelope;
pub mod error;
pub mod interceptor;
pub mod transport;

pub use client::ApiClient;
pub use envelope::ApiEnvelope;
pub use error::ApiError;
pub use interceptor::Interceptor;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
