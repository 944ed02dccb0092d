//! Authentication for the todo web app.
//!
//! Passwords are hashed by [`CredentialStore`], sessions live entirely in
//! the signed `token` cookie issued by [`TokenService`], and routes are
//! protected by the [`PageSession`] / [`ApiSession`] extractors.

pub mod gate;
pub mod handlers;
pub mod password;
mod service;
pub mod token;

pub use gate::{ApiSession, LoginRedirect, PageSession, SESSION_COOKIE};
pub use password::CredentialStore;
pub use service::AuthService;
pub use token::{Claims, IssuedToken, RefreshDecision, TokenRejection, TokenService, TokenStatus};
