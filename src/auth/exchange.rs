//! Token exchanges for each stage of the chain

use super::{AuthError, Credential, Stage};
use crate::fetcher::endpoints::{HALO_RELYING_PARTY, SPARTAN_AUDIENCE, XBOX_RELYING_PARTY};
use crate::fetcher::{FetcherError, HaloHttpClient};
use crate::identifier::Xuid;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Lifetime assumed when a response carries no expiry
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifetime assumed for an OAuth access token without `expires_in`
const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Way of obtaining an OAuth access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthGrant {
    /// Code from an interactive login
    AuthorizationCode(String),
    /// Stored refresh token
    RefreshToken(String),
}

/// Result of the dual XSTS exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualXsts {
    /// Token for the Xbox Live relying party (profile lookups, carries the user hash)
    pub xbox: Credential,
    /// Token for the Halo relying party (exchanged for the Spartan token)
    pub game: Credential,
    /// Account id; None when the account has no Xbox identity
    pub xuid: Option<Xuid>,
}

/// Remote operations behind each stage of the chain
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange a code or refresh token for an access token (with refresh token)
    async fn exchange_oauth(&self, grant: OAuthGrant) -> Result<Credential, AuthError>;

    /// Exchange an access token for an Xbox Live user token
    async fn request_user_token(&self, access_token: &str) -> Result<Credential, AuthError>;

    /// Exchange a user token for both XSTS tokens
    async fn request_dual_xsts(&self, user_token: &str) -> Result<DualXsts, AuthError>;

    /// Exchange the Halo XSTS token for a Spartan token
    async fn request_game_session(&self, xsts_game_token: &str) -> Result<Credential, AuthError>;

    /// Fetch the flight clearance for the account
    async fn request_clearance(&self, spartan_token: &str, xuid: Xuid) -> Result<Credential, AuthError>;
}

/// OAuth application settings
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Azure application id
    pub client_id: String,
    /// Azure application secret
    pub client_secret: String,
    /// Redirect URI registered for the application
    pub redirect_uri: String,
}

impl OAuthSettings {
    /// Settings with the default local redirect
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XboxTokenResponse {
    token: String,
    #[serde(default)]
    not_after: Option<DateTime<Utc>>,
    #[serde(default)]
    display_claims: Option<XboxDisplayClaims>,
}

#[derive(Debug, Deserialize)]
struct XboxDisplayClaims {
    #[serde(default)]
    xui: Vec<XboxUserClaims>,
}

#[derive(Debug, Deserialize)]
struct XboxUserClaims {
    #[serde(default)]
    uhs: Option<String>,
    #[serde(default)]
    xid: Option<String>,
}

impl XboxTokenResponse {
    fn claims(&self) -> Option<&XboxUserClaims> {
        self.display_claims.as_ref().and_then(|c| c.xui.first())
    }

    fn into_credential(self) -> Credential {
        match self.not_after {
            Some(expires_at) => Credential::new(self.token, expires_at),
            None => Credential::valid_for(self.token, DEFAULT_TOKEN_TTL),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpartanTokenResponse {
    spartan_token: String,
    #[serde(default)]
    expires_utc: Option<SpartanExpiry>,
}

#[derive(Debug, Deserialize)]
struct SpartanExpiry {
    #[serde(rename = "ISO8601Date")]
    iso8601_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClearanceResponse {
    flight_configuration_id: String,
}

/// Map a transport error onto the stage being derived
fn stage_error(stage: Stage) -> impl Fn(FetcherError) -> AuthError {
    move |e| match e {
        FetcherError::Unauthorized(_) | FetcherError::NotFound(_) | FetcherError::HttpError { .. } => {
            debug!(%stage, error = %e, "Exchange rejected");
            AuthError::AuthFailure(stage)
        }
        FetcherError::CorruptResponse(message) => AuthError::CorruptResponse { stage, message },
        FetcherError::RateLimited | FetcherError::NetworkError(_) => AuthError::Network(e.to_string()),
    }
}

/// Live exchanges against Microsoft account, Xbox Live and Halo Waypoint
pub struct XboxLiveExchange {
    http: Arc<HaloHttpClient>,
    oauth: OAuthSettings,
}

impl XboxLiveExchange {
    /// Exchange using the given application credentials
    pub fn new(
        http: Arc<HaloHttpClient>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::with_settings(http, OAuthSettings::new(client_id, client_secret))
    }

    /// Exchange with explicit OAuth settings
    pub fn with_settings(http: Arc<HaloHttpClient>, oauth: OAuthSettings) -> Self {
        Self { http, oauth }
    }

    /// OAuth settings in use
    pub fn settings(&self) -> &OAuthSettings {
        &self.oauth
    }

    async fn request_xsts(&self, user_token: &str, relying_party: &str) -> Result<XboxTokenResponse, AuthError> {
        let url = self.http.endpoints().xsts_url.clone();
        let body = json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [user_token]
            },
            "RelyingParty": relying_party,
            "TokenType": "JWT"
        });
        self.http
            .send_json("xsts_authorize", |c| {
                c.post(&url)
                    .header("x-xbl-contract-version", "1")
                    .json(&body)
            })
            .await
            .map_err(stage_error(Stage::XstsXbox))
    }
}

#[async_trait]
impl TokenExchange for XboxLiveExchange {
    async fn exchange_oauth(&self, grant: OAuthGrant) -> Result<Credential, AuthError> {
        let url = self.http.endpoints().oauth_token_url.clone();
        let mut form = vec![
            ("client_id", self.oauth.client_id.clone()),
            ("client_secret", self.oauth.client_secret.clone()),
        ];
        let previous_refresh = match &grant {
            OAuthGrant::AuthorizationCode(code) => {
                form.push(("grant_type", "authorization_code".to_string()));
                form.push(("code", code.clone()));
                form.push(("redirect_uri", self.oauth.redirect_uri.clone()));
                None
            }
            OAuthGrant::RefreshToken(token) => {
                form.push(("grant_type", "refresh_token".to_string()));
                form.push(("refresh_token", token.clone()));
                Some(token.clone())
            }
        };

        let response: OAuthTokenResponse = self
            .http
            .send_json("oauth_token", |c| c.post(&url).form(&form))
            .await
            .map_err(stage_error(Stage::OAuth))?;

        let ttl = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL);
        let mut credential = Credential::valid_for(response.access_token, ttl);
        credential.refresh_token = response.refresh_token.or(previous_refresh);
        info!(expires_at = %credential.expires_at, "Obtained OAuth access token");
        Ok(credential)
    }

    async fn request_user_token(&self, access_token: &str) -> Result<Credential, AuthError> {
        let url = self.http.endpoints().user_auth_url.clone();
        let body = json!({
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={access_token}")
            }
        });
        let response: XboxTokenResponse = self
            .http
            .send_json("user_authenticate", |c| {
                c.post(&url)
                    .header("x-xbl-contract-version", "1")
                    .json(&body)
            })
            .await
            .map_err(stage_error(Stage::UserToken))?;
        Ok(response.into_credential())
    }

    async fn request_dual_xsts(&self, user_token: &str) -> Result<DualXsts, AuthError> {
        let xbox = self.request_xsts(user_token, XBOX_RELYING_PARTY).await?;
        let xuid = xbox
            .claims()
            .and_then(|c| c.xid.as_deref())
            .and_then(|xid| xid.parse::<Xuid>().ok());
        let uhs = xbox.claims().and_then(|c| c.uhs.clone());

        let game = self
            .request_xsts(user_token, HALO_RELYING_PARTY)
            .await
            .map_err(|e| match e {
                AuthError::AuthFailure(_) => AuthError::AuthFailure(Stage::XstsGame),
                other => other,
            })?;

        let mut xbox_credential = xbox.into_credential();
        xbox_credential.uhs = uhs;
        Ok(DualXsts {
            xbox: xbox_credential,
            game: game.into_credential(),
            xuid,
        })
    }

    async fn request_game_session(&self, xsts_game_token: &str) -> Result<Credential, AuthError> {
        let url = self.http.endpoints().spartan_token_url();
        let body = json!({
            "Audience": SPARTAN_AUDIENCE,
            "MinVersion": "4",
            "Proof": [
                { "Token": xsts_game_token, "TokenType": "Xbox_XSTSv3" }
            ]
        });
        let response: SpartanTokenResponse = self
            .http
            .send_json("spartan_token", |c| {
                c.post(&url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(&body)
            })
            .await
            .map_err(stage_error(Stage::GameSession))?;

        let credential = match response.expires_utc {
            Some(expiry) => Credential::new(response.spartan_token, expiry.iso8601_date),
            None => Credential::valid_for(response.spartan_token, DEFAULT_TOKEN_TTL),
        };
        Ok(credential)
    }

    async fn request_clearance(&self, spartan_token: &str, xuid: Xuid) -> Result<Credential, AuthError> {
        let url = self.http.endpoints().clearance_url(&xuid.to_wire());
        let response: ClearanceResponse = self
            .http
            .send_json("clearance", |c| {
                c.get(&url)
                    .header("x-343-authorization-spartan", spartan_token)
                    .header(reqwest::header::ACCEPT, "application/json")
            })
            .await
            .map_err(stage_error(Stage::Clearance))?;
        Ok(Credential::valid_for(response.flight_configuration_id, DEFAULT_TOKEN_TTL))
    }
}
