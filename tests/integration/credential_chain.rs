//! Integration tests for the credential chain over a shared cache

use crate::support::StubExchange;
use chrono::{Duration as ChronoDuration, Utc};
use halo_stats::auth::{AuthError, Credential, CredentialChain, NoLogin, Stage};
use halo_stats::cache::{keys, MemoryStore, PersistentCache};
use halo_stats::Xuid;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn valid(token: &str) -> Credential {
    Credential::new(token, Utc::now() + ChronoDuration::hours(1))
}

fn expired(token: &str) -> Credential {
    Credential::new(token, Utc::now() - ChronoDuration::minutes(5))
}

async fn seeded(credentials: BTreeMap<Stage, Credential>) -> (CredentialChain, Arc<StubExchange>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let cache = PersistentCache::new(store.clone());
    cache.save(&keys::credentials("acct"), &credentials).await.unwrap();

    let exchange = Arc::new(StubExchange::default());
    let chain = CredentialChain::new("acct", exchange.clone(), Arc::new(NoLogin), cache);
    (chain, exchange, store)
}

fn stored_chain() -> BTreeMap<Stage, Credential> {
    let mut creds = BTreeMap::new();
    creds.insert(Stage::OAuth, valid("access").with_refresh_token("refresh"));
    creds.insert(Stage::UserToken, valid("user"));
    creds.insert(Stage::XstsXbox, valid("xbox").with_uhs("uhs").with_xuid(Xuid::new(42)));
    creds.insert(Stage::XstsGame, valid("game").with_xuid(Xuid::new(42)));
    creds.insert(Stage::GameSession, valid("spartan"));
    creds.insert(Stage::Clearance, valid("clearance"));
    creds
}

#[tokio::test]
async fn test_expired_session_rederives_only_the_suffix() {
    let mut creds = stored_chain();
    creds.insert(Stage::GameSession, expired("old-spartan"));
    let (chain, exchange, store) = seeded(creds).await;

    let writes = store.write_count(&keys::credentials("acct"));
    let clearance = chain.ensure(Stage::Clearance).await.unwrap();

    assert_eq!(clearance.token, "clearance");
    // game session and clearance only
    assert_eq!(exchange.total_calls(), 2);
    assert_eq!(exchange.xsts_calls(), 0);
    assert_eq!(store.write_count(&keys::credentials("acct")) - writes, 2);

    let snapshot = chain.snapshot().await.unwrap();
    assert_eq!(snapshot[&Stage::GameSession].token, "spartan<game>");
    assert_eq!(snapshot[&Stage::XstsXbox].token, "xbox");
}

#[tokio::test]
async fn test_valid_chain_needs_no_exchange() {
    let (chain, exchange, _) = seeded(stored_chain()).await;

    let session = chain.session().await.unwrap();
    assert_eq!(session.spartan_token, "spartan");
    assert_eq!(session.clearance, "clearance");
    assert_eq!(session.xuid, Xuid::new(42));

    let auth = chain.profile_auth().await.unwrap();
    assert_eq!(auth.authorization_header(), "XBL3.0 x=uhs;xbox");
    assert_eq!(exchange.total_calls(), 0);
}

#[tokio::test]
async fn test_expired_access_token_uses_refresh_token() {
    let mut creds = stored_chain();
    creds.insert(Stage::OAuth, expired("access").with_refresh_token("refresh"));
    creds.insert(Stage::UserToken, expired("user"));
    let (chain, exchange, _) = seeded(creds).await;

    chain.ensure(Stage::UserToken).await.unwrap();
    assert_eq!(exchange.total_calls(), 2);
}

#[tokio::test]
async fn test_missing_root_without_login_requires_login() {
    let (chain, exchange, _) = seeded(BTreeMap::new()).await;

    let err = chain.ensure(Stage::Clearance).await.unwrap_err();
    assert!(matches!(err, AuthError::LoginRequired(ref account) if account == "acct"));
    assert!(err.is_permanent());
    assert_eq!(exchange.total_calls(), 0);
}

#[tokio::test]
async fn test_invalidating_xsts_drops_descendants() {
    let (chain, exchange, _) = seeded(stored_chain()).await;

    chain.invalidate(Stage::XstsGame).await.unwrap();
    let snapshot = chain.snapshot().await.unwrap();
    assert!(!snapshot.contains_key(&Stage::XstsGame));
    assert!(!snapshot.contains_key(&Stage::GameSession));
    assert!(!snapshot.contains_key(&Stage::Clearance));
    assert!(snapshot.contains_key(&Stage::XstsXbox));

    chain.ensure(Stage::Clearance).await.unwrap();
    // dual XSTS, game session, clearance
    assert_eq!(exchange.total_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_respects_cooldown() {
    let (chain, exchange, _) = seeded(stored_chain()).await;
    let chain = chain.with_cooldown(Duration::from_secs(60));

    chain.force_refresh(Stage::Clearance).await.unwrap();
    assert_eq!(exchange.xsts_calls(), 1);

    let err = chain.force_refresh(Stage::Clearance).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshCooldown { .. }));
    assert_eq!(exchange.xsts_calls(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    chain.force_refresh(Stage::Clearance).await.unwrap();
    assert_eq!(exchange.xsts_calls(), 2);
}
