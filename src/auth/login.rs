//! Interactive login seam
//!
//! When the chain has neither a valid access token nor a refresh token it needs
//! a fresh authorization code. Obtaining one (browser, local callback listener)
//! is outside this crate; providers here only hand over a code obtained
//! elsewhere.

use super::AuthError;
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Mutex;

/// Microsoft account authorize endpoint
pub const AUTHORIZE_URL: &str = "https://login.live.com/oauth20_authorize.srf";

/// Scopes requested for Xbox Live sign-in with offline access
pub const XBOX_SCOPES: &str = "Xboxlive.signin Xboxlive.offline_access";

/// Supplies authorization codes for accounts that need a new login
#[async_trait]
pub trait LoginProvider: Send + Sync {
    /// Authorization code for `account_id`, or None if none is available
    async fn authorization_code(&self, account_id: &str) -> Result<Option<String>, AuthError>;
}

/// Never supplies a code; chains needing a login fail with `LoginRequired`
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLogin;

#[async_trait]
impl LoginProvider for NoLogin {
    async fn authorization_code(&self, _account_id: &str) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

/// Hands out one code supplied out of band, e.g. pasted on the command line
#[derive(Debug)]
pub struct AuthorizationCodeLogin {
    code: Mutex<Option<String>>,
}

impl AuthorizationCodeLogin {
    /// Provider holding `code`
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Mutex::new(Some(code.into())),
        }
    }
}

#[async_trait]
impl LoginProvider for AuthorizationCodeLogin {
    async fn authorization_code(&self, _account_id: &str) -> Result<Option<String>, AuthError> {
        Ok(self.code.lock().ok().and_then(|mut code| code.take()))
    }
}

/// URL the user opens to sign in and obtain an authorization code
///
/// # Examples
///
/// ```
/// let url = halo_stats::auth::authorize_url("abc", "http://localhost:8080").unwrap();
/// assert!(url.starts_with("https://login.live.com/oauth20_authorize.srf?client_id=abc"));
/// ```
pub fn authorize_url(client_id: &str, redirect_uri: &str) -> Result<String, AuthError> {
    Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", XBOX_SCOPES),
        ],
    )
    .map(String::from)
    .map_err(|e| AuthError::Network(format!("invalid authorize URL: {e}")))
}
