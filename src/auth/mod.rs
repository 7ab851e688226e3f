//! Credential exchange for a bearer access token.
//!
//! The platform issues tokens through an OAuth2 resource-owner password
//! grant on the instance's `/restapi/oauth2/token` endpoint, using the
//! mobile app's public client id. There is no refresh or retry: a run uses
//! the one token it obtained at start-up.

pub mod error;

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

pub use self::error::AuthError;
use crate::platform::{build_http_client, Endpoints};

/// Public client id of the platform's mobile app.
const CLIENT_ID: &str = "10ae9d30-1853-48ff-81cb-47b58a325685";

/// Opaque bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    #[cfg(test)]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Exchanges a username and password for an [`AccessToken`].
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str)
        -> Result<AccessToken, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 password-grant authenticator.
#[derive(Debug)]
pub struct PasswordGrant {
    client: Client,
    token_url: Url,
    timeout: Duration,
}

impl PasswordGrant {
    pub fn new(endpoints: &Endpoints, timeout: Duration) -> Result<Self, AuthError> {
        Ok(Self {
            client: build_http_client(false, timeout)?,
            token_url: endpoints.token.clone(),
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl Authenticator for PasswordGrant {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AccessToken, AuthError> {
        tracing::debug!("Requesting access token for {}", username);
        let response = self
            .client
            .post(self.token_url.clone())
            .form(&[
                ("client_id", CLIENT_ID),
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ])
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        token_from_response(status, &body)
    }
}

/// Interpret the token endpoint's reply.
///
/// 400/401 mean the credentials were rejected (`invalid_grant`); other
/// non-success codes are reported as API errors.
fn token_from_response(status: u16, body: &[u8]) -> Result<AccessToken, AuthError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_slice::<TokenResponse>(body)
            .ok()
            .and_then(|r| r.error_description.or(r.error))
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
        return Err(match status {
            400 | 401 => AuthError::FailedLogin(message),
            code => AuthError::ApiError { code, message },
        });
    }

    let parsed: TokenResponse = serde_json::from_slice(body)?;
    match parsed.access_token {
        Some(token) if !token.is_empty() => Ok(AccessToken(token)),
        _ => Err(AuthError::MissingToken),
    }
}
