//! Session-based authorization against the service API.
//!
//! The flow mirrors the service's app-auth handshake: generate a session,
//! hand its url to the user, poll the userkey endpoint until the user grants
//! access, then derive the api token every authenticated call carries
//! (including the streaming `i` query parameter).

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::AuthError;

/// Where the service API lives and which application is asking.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Base URL of the service API, e.g. `https://example.social/api`.
    pub api_url: String,
    /// Secret issued to the application at registration.
    pub app_secret: String,
}

impl AuthConfig {
    /// Config for a host reached over HTTPS, the production shape.
    #[must_use]
    pub fn for_host(host: &str, app_secret: impl Into<String>) -> Self {
        Self {
            api_url: format!("https://{host}/api"),
            app_secret: app_secret.into(),
        }
    }
}

/// One authorization session awaiting the user's grant.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthSession {
    /// Session token the userkey endpoint is polled with.
    pub token: String,
    /// Page where the user grants access; hand this to a browser.
    pub url: String,
}

/// The userkey payload returned once the user has granted access.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserKey {
    /// The user's access token.
    pub access_token: String,
    /// The granting user, verbatim from the service.
    #[serde(default)]
    pub user: Value,
}

/// Everything an authenticated client needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// The user's access token as issued.
    pub user_token: String,
    /// Derived token sent as `i` on API and streaming requests.
    pub api_token: String,
}

impl Credentials {
    /// Build credentials from an access token, applying the derivation.
    #[must_use]
    pub fn derive(user_token: &str, app_secret: &str) -> Self {
        Self {
            user_token: user_token.to_string(),
            api_token: derive_api_token(user_token, app_secret),
        }
    }
}

/// Lowercase hex sha256 over the user token concatenated with the app
/// secret, in that order.
#[must_use]
pub fn derive_api_token(user_token: &str, app_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_token.as_bytes());
    hasher.update(app_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Start an authorization session.
///
/// # Errors
///
/// [`AuthError::Http`] on transport failure, [`AuthError::Api`] on a
/// non-success status.
#[tracing::instrument(skip_all)]
pub async fn generate_session(
    client: &reqwest::Client,
    config: &AuthConfig,
) -> Result<AuthSession, AuthError> {
    let resp = client
        .post(format!("{}/auth/session/generate", config.api_url))
        .json(&serde_json::json!({ "appSecret": config.app_secret }))
        .send()
        .await?;

    let status = resp.status().as_u16();
    if status != 200 {
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::Api {
            status,
            message: text,
        });
    }

    let session: AuthSession = resp.json().await?;
    tracing::debug!(url = %session.url, "authorization session created");
    Ok(session)
}

/// Ask whether the user has granted access yet.
///
/// The endpoint reports "not yet" as an error payload, indistinguishable
/// from other API errors, so any error payload means keep waiting.
///
/// # Errors
///
/// [`AuthError::Http`] on transport failure, [`AuthError::Json`] when a
/// grant payload does not decode.
#[tracing::instrument(skip_all)]
pub async fn poll_user_key(
    client: &reqwest::Client,
    config: &AuthConfig,
    session_token: &str,
) -> Result<Option<UserKey>, AuthError> {
    let resp = client
        .post(format!("{}/auth/session/userkey", config.api_url))
        .json(&serde_json::json!({
            "appSecret": config.app_secret,
            "token": session_token,
        }))
        .send()
        .await?;

    let text = resp.text().await?;
    let value: Value = serde_json::from_str(&text)?;
    if value.get("error").is_some() {
        return Ok(None);
    }
    let key: UserKey = serde_json::from_value(value)?;
    Ok(Some(key))
}

/// Poll until the user grants access, then derive [`Credentials`].
///
/// Polls immediately, then once per `poll_interval`. Runs until the grant
/// arrives; bound the wait with `tokio::time::timeout` where one is needed.
/// Dropping the future cancels the wait.
///
/// # Errors
///
/// Transport and decode failures from [`poll_user_key`] propagate
/// immediately.
#[tracing::instrument(skip_all)]
pub async fn await_authorization(
    client: &reqwest::Client,
    config: &AuthConfig,
    session_token: &str,
    poll_interval: Duration,
) -> Result<Credentials, AuthError> {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        let _ = ticker.tick().await;
        if let Some(key) = poll_user_key(client, config, session_token).await? {
            tracing::info!("authorization granted");
            return Ok(Credentials::derive(&key.access_token, &config.app_secret));
        }
        tracing::debug!("authorization pending");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
