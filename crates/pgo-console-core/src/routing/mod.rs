//! Navigation checks for the console's views.
//!
//! Protected routes pass two gates in a fixed order: the auth gate, then
//! the password-change gate.

pub mod gates;
pub mod table;

pub use gates::{AuthGate, Navigation, Navigator, PasswordChangeGate, RouteGate, RouteGuard};
pub use table::{DEFAULT_ROUTE, LOGIN_ROUTE, PASSWORD_CHANGE_ROUTE, SPLASH_ROUTE};
