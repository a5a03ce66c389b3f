//! Delegated credential chain
//!
//! Access to the Halo stats service is obtained through an ordered series of
//! token exchanges:
//!
//! ```text
//! OAuth ─▶ UserToken ─┬▶ XstsXbox                      (profile lookups)
//!                     └▶ XstsGame ─▶ GameSession ─▶ Clearance (match data)
//! ```
//!
//! Both XSTS tokens come from one "dual XSTS" exchange. They share the
//! account's XUID but are issued for different relying parties.

use crate::cache::CacheError;
use crate::identifier::Xuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod chain;
pub mod exchange;
pub mod login;

pub use chain::{CredentialChain, ProfileAuth, SessionCredentials};
pub use exchange::{DualXsts, OAuthGrant, OAuthSettings, TokenExchange, XboxLiveExchange};
pub use login::{authorize_url, AuthorizationCodeLogin, LoginProvider, NoLogin};

/// One stage of the credential chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Microsoft account access token (carries the refresh token)
    #[serde(rename = "oauth")]
    OAuth,
    /// Xbox Live user token
    UserToken,
    /// XSTS token for the Xbox Live relying party
    XstsXbox,
    /// XSTS token for the Halo Waypoint relying party
    XstsGame,
    /// Spartan token for the Halo services
    GameSession,
    /// Flight clearance id
    Clearance,
}

impl Stage {
    /// Every stage, parents before children
    pub const ALL: [Stage; 6] = [
        Stage::OAuth,
        Stage::UserToken,
        Stage::XstsXbox,
        Stage::XstsGame,
        Stage::GameSession,
        Stage::Clearance,
    ];

    /// Stage whose token this stage is derived from
    pub fn parent(self) -> Option<Stage> {
        match self {
            Stage::OAuth => None,
            Stage::UserToken => Some(Stage::OAuth),
            Stage::XstsXbox | Stage::XstsGame => Some(Stage::UserToken),
            Stage::GameSession => Some(Stage::XstsGame),
            Stage::Clearance => Some(Stage::GameSession),
        }
    }

    /// Whether this stage was derived, directly or not, from `ancestor`
    pub fn descends_from(self, ancestor: Stage) -> bool {
        let mut current = self.parent();
        while let Some(stage) = current {
            if stage == ancestor {
                return true;
            }
            current = stage.parent();
        }
        false
    }

    /// Stages from the root down to and including `self`
    pub fn path(self) -> Vec<Stage> {
        let mut path = vec![self];
        let mut current = self.parent();
        while let Some(stage) = current {
            path.push(stage);
            current = stage.parent();
        }
        path.reverse();
        path
    }

    /// Whether both XSTS stages are produced by this stage's exchange
    pub fn is_xsts(self) -> bool {
        matches!(self, Stage::XstsXbox | Stage::XstsGame)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::OAuth => "oauth",
            Stage::UserToken => "user_token",
            Stage::XstsXbox => "xsts_xbox",
            Stage::XstsGame => "xsts_game",
            Stage::GameSession => "game_session",
            Stage::Clearance => "clearance",
        };
        f.write_str(name)
    }
}

/// A token issued by one stage of the chain
///
/// Expiry is authoritative: an expired credential is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token (or clearance id)
    pub token: String,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
    /// OAuth refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Xbox user hash, present on XSTS tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uhs: Option<String>,
    /// Account id, present on XSTS tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xuid: Option<Xuid>,
}

impl Credential {
    /// Credential valid until `expires_at`
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
            refresh_token: None,
            uhs: None,
            xuid: None,
        }
    }

    /// Credential valid for `ttl` from now
    pub fn valid_for(token: impl Into<String>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        Self::new(token, Utc::now() + ttl)
    }

    /// Attach a refresh token
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Attach the user hash
    pub fn with_uhs(mut self, uhs: impl Into<String>) -> Self {
        self.uhs = Some(uhs.into());
        self
    }

    /// Attach the account id
    pub fn with_xuid(mut self, xuid: Xuid) -> Self {
        self.xuid = Some(xuid);
        self
    }

    /// Whether the credential is unexpired at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whether the credential is unexpired now
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Credential chain errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The remote exchange rejected the credential for this stage
    #[error("authentication failed at stage {0}")]
    AuthFailure(Stage),

    /// The account has no Xbox identity usable for Halo
    #[error("account is not eligible: no XUID was issued (has it ever played Halo Infinite?)")]
    AccountNotEligible,

    /// No refresh token and no authorization code available
    #[error("interactive login required for account {0}")]
    LoginRequired(String),

    /// A forced refresh already ran too recently
    #[error("credential refresh on cooldown for another {}s", remaining.as_secs())]
    RefreshCooldown {
        /// Time left until another forced refresh is allowed
        remaining: Duration,
    },

    /// Another forced refresh is running on this chain
    #[error("credential refresh already in progress")]
    RefreshInProgress,

    /// Exchange response could not be understood
    #[error("corrupt response from {stage}: {message}")]
    CorruptResponse {
        /// Stage being derived
        stage: Stage,
        /// Parse failure
        message: String,
    },

    /// Transport failure talking to an exchange
    #[error("network error: {0}")]
    Network(String),

    /// Could not persist credentials
    #[error("credential cache error: {0}")]
    Cache(#[from] CacheError),
}

impl AuthError {
    /// Whether a later attempt cannot succeed without user action
    pub fn is_permanent(&self) -> bool {
        matches!(self, AuthError::AccountNotEligible | AuthError::LoginRequired(_))
    }
}
