//! Credential chain state machine
//!
//! The derivation path of the requested stage is checked from the root
//! down. Everything from the first missing or expired stage onward is
//! derived again, in order, so the unexpired prefix is kept. Deriving a stage discards everything derived
//! from its previous token, so a stale descendant can never outlive its
//! ancestor. The chain is persisted after every successful derivation.

use super::exchange::{OAuthGrant, TokenExchange};
use super::login::LoginProvider;
use super::{AuthError, Credential, Stage};
use crate::cache::{keys, PersistentCache};
use crate::identifier::Xuid;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Minimum interval between two forced refreshes of one chain
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

type Credentials = BTreeMap<Stage, Credential>;

/// Tokens needed for Halo stats calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Spartan token
    pub spartan_token: String,
    /// Flight clearance id
    pub clearance: String,
    /// Account the session belongs to
    pub xuid: Xuid,
}

/// Tokens needed for Xbox profile lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileAuth {
    /// User hash from the Xbox XSTS token
    pub uhs: String,
    /// Xbox XSTS token
    pub token: String,
}

impl ProfileAuth {
    /// Value of the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("XBL3.0 x={};{}", self.uhs, self.token)
    }
}

/// Clears the busy flag when a forced refresh ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-account credential chain
pub struct CredentialChain {
    account_id: String,
    exchange: Arc<dyn TokenExchange>,
    login: Arc<dyn LoginProvider>,
    cache: PersistentCache,
    /// None until loaded from the cache
    state: Mutex<Option<Credentials>>,
    refreshing: AtomicBool,
    last_forced: std::sync::Mutex<Option<Instant>>,
    cooldown: Duration,
}

impl CredentialChain {
    /// Chain for `account_id`, persisted under `credentials/<account_id>`
    pub fn new(
        account_id: impl Into<String>,
        exchange: Arc<dyn TokenExchange>,
        login: Arc<dyn LoginProvider>,
        cache: PersistentCache,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            exchange,
            login,
            cache,
            state: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            last_forced: std::sync::Mutex::new(None),
            cooldown: DEFAULT_REFRESH_COOLDOWN,
        }
    }

    /// Override the forced-refresh cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Account this chain belongs to
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Usable credential for `target`, deriving whatever has expired
    ///
    /// # Errors
    /// - `LoginRequired` if the root must be re-authorized and no code is available
    /// - `AuthFailure(stage)` if an exchange rejects its input
    /// - `AccountNotEligible` if the XSTS exchange issues no XUID
    pub async fn ensure(&self, target: Stage) -> Result<Credential, AuthError> {
        let mut guard = self.state.lock().await;
        let creds = self.loaded(&mut guard).await?;
        self.ensure_locked(creds, target).await
    }

    /// Session tokens for stats calls
    pub async fn session(&self) -> Result<SessionCredentials, AuthError> {
        let mut guard = self.state.lock().await;
        let creds = self.loaded(&mut guard).await?;
        let clearance = self.ensure_locked(creds, Stage::Clearance).await?;

        let spartan = creds
            .get(&Stage::GameSession)
            .ok_or(AuthError::AuthFailure(Stage::GameSession))?;
        let xuid = creds
            .get(&Stage::XstsGame)
            .and_then(|c| c.xuid)
            .ok_or(AuthError::AccountNotEligible)?;

        Ok(SessionCredentials {
            spartan_token: spartan.token.clone(),
            clearance: clearance.token,
            xuid,
        })
    }

    /// Tokens for profile lookups
    pub async fn profile_auth(&self) -> Result<ProfileAuth, AuthError> {
        let credential = self.ensure(Stage::XstsXbox).await?;
        let uhs = credential.uhs.ok_or_else(|| AuthError::CorruptResponse {
            stage: Stage::XstsXbox,
            message: "XSTS token carries no user hash".to_string(),
        })?;
        Ok(ProfileAuth {
            uhs,
            token: credential.token,
        })
    }

    /// Drop the XSTS stages and everything below, then derive `target` again
    ///
    /// # Errors
    /// - `RefreshInProgress` if another forced refresh is running
    /// - `RefreshCooldown` if the last forced refresh was too recent
    /// - any error from [`Self::ensure`]
    pub async fn force_refresh(&self, target: Stage) -> Result<Credential, AuthError> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            debug!(account = %self.account_id, "Forced refresh already running");
            return Err(AuthError::RefreshInProgress);
        }
        let _busy = BusyGuard(&self.refreshing);

        {
            let mut last = self.last_forced.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(at) = *last {
                let elapsed = at.elapsed();
                if elapsed < self.cooldown {
                    let remaining = self.cooldown - elapsed;
                    warn!(
                        account = %self.account_id,
                        remaining_secs = remaining.as_secs(),
                        "Forced refresh on cooldown"
                    );
                    return Err(AuthError::RefreshCooldown { remaining });
                }
            }
            *last = Some(Instant::now());
        }

        info!(account = %self.account_id, %target, "Forcing credential refresh");
        crate::metrics::record_forced_refresh(&self.account_id);

        let mut guard = self.state.lock().await;
        let creds = self.loaded(&mut guard).await?;
        Self::discard(creds, Stage::XstsXbox);
        Self::discard(creds, Stage::XstsGame);
        self.persist(creds).await?;
        self.ensure_locked(creds, target).await
    }

    /// Drop `stage` and everything derived from it
    pub async fn invalidate(&self, stage: Stage) -> Result<(), AuthError> {
        let mut guard = self.state.lock().await;
        let creds = self.loaded(&mut guard).await?;
        Self::discard(creds, stage);
        self.persist(creds).await
    }

    /// Exchange an authorization code and store the result as the new root
    pub async fn store_grant(&self, code: &str) -> Result<(), AuthError> {
        let mut guard = self.state.lock().await;
        let creds = self.loaded(&mut guard).await?;
        let credential = self
            .exchange
            .exchange_oauth(OAuthGrant::AuthorizationCode(code.to_string()))
            .await?;
        self.store(creds, vec![(Stage::OAuth, credential)]).await
    }

    /// Copy of the stored credentials
    pub async fn snapshot(&self) -> Result<BTreeMap<Stage, Credential>, AuthError> {
        let mut guard = self.state.lock().await;
        Ok(self.loaded(&mut guard).await?.clone())
    }

    async fn loaded<'a>(&self, guard: &'a mut Option<Credentials>) -> Result<&'a mut Credentials, AuthError> {
        if guard.is_none() {
            let stored: Option<Credentials> = self.cache.load(&keys::credentials(&self.account_id)).await?;
            debug!(
                account = %self.account_id,
                stages = stored.as_ref().map_or(0, BTreeMap::len),
                "Loaded stored credentials"
            );
            *guard = Some(stored.unwrap_or_default());
        }
        Ok(guard.get_or_insert_with(BTreeMap::new))
    }

    async fn ensure_locked(&self, creds: &mut Credentials, target: Stage) -> Result<Credential, AuthError> {
        let now = Utc::now();
        let path = target.path();
        let first_to_derive = match path
            .iter()
            .position(|stage| !creds.get(stage).is_some_and(|c| c.is_valid_at(now)))
        {
            Some(idx) => idx,
            None => {
                return creds
                    .get(&target)
                    .cloned()
                    .ok_or(AuthError::AuthFailure(target));
            }
        };

        for stage in &path[first_to_derive..] {
            self.derive(creds, *stage).await?;
        }

        creds.get(&target).cloned().ok_or(AuthError::AuthFailure(target))
    }

    async fn derive(&self, creds: &mut Credentials, stage: Stage) -> Result<(), AuthError> {
        debug!(account = %self.account_id, %stage, "Deriving credential");
        let derived = match stage {
            Stage::OAuth => vec![(Stage::OAuth, self.derive_root(creds).await?)],
            Stage::UserToken => {
                let access = Self::token_of(creds, Stage::OAuth)?;
                vec![(Stage::UserToken, self.exchange.request_user_token(&access).await?)]
            }
            Stage::XstsXbox | Stage::XstsGame => {
                let user = Self::token_of(creds, Stage::UserToken)?;
                let dual = self.exchange.request_dual_xsts(&user).await?;
                let Some(xuid) = dual.xuid else {
                    warn!(account = %self.account_id, "XSTS exchange issued no XUID");
                    return Err(AuthError::AccountNotEligible);
                };
                vec![
                    (Stage::XstsXbox, dual.xbox.with_xuid(xuid)),
                    (Stage::XstsGame, dual.game.with_xuid(xuid)),
                ]
            }
            Stage::GameSession => {
                let xsts = Self::token_of(creds, Stage::XstsGame)?;
                vec![(Stage::GameSession, self.exchange.request_game_session(&xsts).await?)]
            }
            Stage::Clearance => {
                let spartan = Self::token_of(creds, Stage::GameSession)?;
                let xuid = creds
                    .get(&Stage::XstsGame)
                    .and_then(|c| c.xuid)
                    .ok_or(AuthError::AccountNotEligible)?;
                vec![(Stage::Clearance, self.exchange.request_clearance(&spartan, xuid).await?)]
            }
        };

        self.store(creds, derived).await
    }

    /// Refresh the access token, falling back to a fresh login
    async fn derive_root(&self, creds: &Credentials) -> Result<Credential, AuthError> {
        let refresh_token = creds.get(&Stage::OAuth).and_then(|c| c.refresh_token.clone());

        let refresh_error = match refresh_token {
            Some(token) => match self.exchange.exchange_oauth(OAuthGrant::RefreshToken(token)).await {
                Ok(credential) => return Ok(credential),
                Err(AuthError::AuthFailure(stage)) => {
                    warn!(account = %self.account_id, "Refresh token rejected, falling back to login");
                    Some(AuthError::AuthFailure(stage))
                }
                Err(other) => return Err(other),
            },
            None => None,
        };

        match self.login.authorization_code(&self.account_id).await? {
            Some(code) => {
                self.exchange
                    .exchange_oauth(OAuthGrant::AuthorizationCode(code))
                    .await
            }
            None => Err(refresh_error.unwrap_or_else(|| AuthError::LoginRequired(self.account_id.clone()))),
        }
    }

    async fn store(&self, creds: &mut Credentials, derived: Vec<(Stage, Credential)>) -> Result<(), AuthError> {
        for (stage, credential) in derived {
            Self::discard(creds, stage);
            info!(
                account = %self.account_id,
                %stage,
                expires_at = %credential.expires_at,
                "Credential derived"
            );
            crate::metrics::record_credential_derived(stage);
            creds.insert(stage, credential);
        }
        self.persist(creds).await
    }

    async fn persist(&self, creds: &Credentials) -> Result<(), AuthError> {
        self.cache
            .save(&keys::credentials(&self.account_id), creds)
            .await
            .map_err(AuthError::from)
    }

    fn discard(creds: &mut Credentials, stage: Stage) {
        creds.retain(|s, _| *s != stage && !s.descends_from(stage));
    }

    fn token_of(creds: &Credentials, stage: Stage) -> Result<String, AuthError> {
        creds
            .get(&stage)
            .map(|c| c.token.clone())
            .ok_or(AuthError::AuthFailure(stage))
    }
}
