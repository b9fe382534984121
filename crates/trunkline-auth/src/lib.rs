//! # trunkline-auth
//!
//! Session-based authorization for the service API.
//!
//! The flow has three steps:
//! 1. [`generate_session`] creates a session and yields the grant page url.
//! 2. [`await_authorization`] (or manual [`poll_user_key`] calls) waits for
//!    the user to grant access.
//! 3. The resulting [`Credentials`] carry the derived `i` token consumed by
//!    authenticated API calls and the streaming connection.

#![deny(unsafe_code)]

pub mod errors;
pub mod session;

pub use errors::AuthError;
pub use session::{
    AuthConfig, AuthSession, Credentials, UserKey, await_authorization, derive_api_token,
    generate_session, poll_user_key,
};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let config = AuthConfig::for_host("example.social", "secret");
        let creds = Credentials::derive("tok", &config.app_secret);
        assert_eq!(creds.api_token.len(), 64);
    }
}
