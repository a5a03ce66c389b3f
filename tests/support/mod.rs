//! In-memory services shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use halo_stats::accounts::{Account, AccountPool, IdentityResolver, RateLimiter};
use halo_stats::aggregator::{AggregatorConfig, MatchAggregator};
use halo_stats::auth::{
    AuthError, AuthorizationCodeLogin, Credential, CredentialChain, DualXsts, OAuthGrant, ProfileAuth,
    SessionCredentials, TokenExchange,
};
use halo_stats::cache::{MemoryStore, PersistentCache};
use halo_stats::fetcher::{
    FetcherError, FetcherResult, MatchDetail, MatchHistoryFetcher, PlayerProfile, PlayerResult, ProfileFetcher,
};
use halo_stats::Xuid;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Player whose history the fake service holds
pub const PLAYER: u64 = 2533274800000001;

/// Co-players rotate through this many ids starting at [`CO_PLAYER_BASE`]
pub const CO_PLAYER_POOL: u64 = 6;

/// First co-player id
pub const CO_PLAYER_BASE: u64 = 2533274800001000;

const HOUR: Duration = Duration::from_secs(3600);

pub fn player() -> Xuid {
    Xuid::new(PLAYER)
}

/// Token exchange that always succeeds and counts dual XSTS exchanges
#[derive(Default)]
pub struct StubExchange {
    xsts_calls: AtomicUsize,
    total_calls: AtomicUsize,
}

impl StubExchange {
    pub fn xsts_calls(&self) -> usize {
        self.xsts_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TokenExchange for StubExchange {
    async fn exchange_oauth(&self, _grant: OAuthGrant) -> Result<Credential, AuthError> {
        self.hit();
        Ok(Credential::valid_for("access", HOUR).with_refresh_token("refresh"))
    }

    async fn request_user_token(&self, _access_token: &str) -> Result<Credential, AuthError> {
        self.hit();
        Ok(Credential::valid_for("user", HOUR))
    }

    async fn request_dual_xsts(&self, _user_token: &str) -> Result<DualXsts, AuthError> {
        self.hit();
        let n = self.xsts_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DualXsts {
            xbox: Credential::valid_for(format!("xbox-{n}"), HOUR).with_uhs("uhs"),
            game: Credential::valid_for(format!("game-{n}"), HOUR),
            xuid: Some(Xuid::new(42)),
        })
    }

    async fn request_game_session(&self, xsts_game_token: &str) -> Result<Credential, AuthError> {
        self.hit();
        Ok(Credential::valid_for(format!("spartan<{xsts_game_token}>"), HOUR))
    }

    async fn request_clearance(&self, _spartan_token: &str, _xuid: Xuid) -> Result<Credential, AuthError> {
        self.hit();
        Ok(Credential::valid_for("clearance", HOUR))
    }
}

/// Scripted Halo match history for [`PLAYER`]
///
/// Match `m{k}` started `k` minutes after a fixed base time, so a higher `k`
/// is newer. Pages list ids newest first.
pub struct FakeHistory {
    ids: Mutex<Vec<String>>,
    next: AtomicUsize,
    page_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    reject_next: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl FakeHistory {
    /// History of `n` matches, `m0` oldest
    pub fn with_matches(n: usize) -> Self {
        let history = Self {
            ids: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            reject_next: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
        };
        history.play(n);
        history
    }

    /// Append `n` newer matches
    pub fn play(&self, n: usize) {
        let mut ids = self.ids.lock().unwrap();
        for _ in 0..n {
            let k = self.next.fetch_add(1, Ordering::SeqCst);
            ids.insert(0, format!("m{k}"));
        }
    }

    /// Insert an id at an arbitrary position of the listing
    pub fn insert_listing(&self, position: usize, id: &str) {
        self.ids.lock().unwrap().insert(position, id.to_string());
    }

    /// Answer the next `n` calls (page or detail) with 401
    pub fn reject_next(&self, n: usize) {
        self.reject_next.store(n, Ordering::SeqCst);
    }

    /// Make detail lookups for `id` fail until cleared
    pub fn fail_detail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.page_calls() + self.detail_calls()
    }

    fn rejected(&self) -> bool {
        self.reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Co-players of match `m{k}`: two ids from the rotating pool
    pub fn co_players(k: u64) -> [Xuid; 2] {
        [
            Xuid::new(CO_PLAYER_BASE + k % CO_PLAYER_POOL),
            Xuid::new(CO_PLAYER_BASE + (k + 1) % CO_PLAYER_POOL),
        ]
    }

    fn detail(match_id: &str) -> MatchDetail {
        let k: u64 = match_id.trim_start_matches('m').parse().unwrap_or(0);
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let outcome_code = match k % 4 {
            0 => 2,
            1 => 3,
            2 => 2,
            _ => 1,
        };

        let mut players = vec![PlayerResult {
            player_id: format!("xuid({PLAYER})"),
            xuid: Some(player()),
            outcome_code,
            core: Some((10, 5, 3)),
        }];
        for co in Self::co_players(k) {
            players.push(PlayerResult {
                player_id: format!("xuid({})", co.value()),
                xuid: Some(co),
                outcome_code: 2,
                core: Some((1, 1, 1)),
            });
        }
        players.push(PlayerResult {
            player_id: "bid(2.0)".to_string(),
            xuid: None,
            outcome_code: 3,
            core: Some((0, 9, 0)),
        });

        MatchDetail {
            match_id: match_id.to_string(),
            start_time: base + ChronoDuration::minutes(k as i64),
            duration: "PT10M".to_string(),
            players,
        }
    }
}

#[async_trait]
impl MatchHistoryFetcher for FakeHistory {
    async fn fetch_match_page(
        &self,
        _session: &SessionCredentials,
        xuid: Xuid,
        start: usize,
        count: usize,
    ) -> FetcherResult<Vec<String>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected() {
            return Err(FetcherError::Unauthorized("match_list: 401".to_string()));
        }
        if xuid != player() {
            return Err(FetcherError::NotFound(xuid.to_wire()));
        }
        let ids = self.ids.lock().unwrap();
        Ok(ids.iter().skip(start).take(count).cloned().collect())
    }

    async fn fetch_match_detail(&self, _session: &SessionCredentials, match_id: &str) -> FetcherResult<MatchDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected() {
            return Err(FetcherError::Unauthorized("match_stats: 401".to_string()));
        }
        if self.failing.lock().unwrap().contains(match_id) {
            return Err(FetcherError::NetworkError("connection reset".to_string()));
        }
        Ok(Self::detail(match_id))
    }
}

/// Profile service over a fixed directory
#[derive(Default)]
pub struct Directory {
    entries: BTreeMap<Xuid, String>,
    lookups: AtomicUsize,
}

impl Directory {
    pub fn new(entries: &[(u64, &str)]) -> Self {
        Self {
            entries: entries.iter().map(|(x, n)| (Xuid::new(*x), n.to_string())).collect(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Directory naming [`PLAYER`] and every co-player
    pub fn full() -> Self {
        let mut entries = vec![(PLAYER, "Spartan Main".to_string())];
        for i in 0..CO_PLAYER_POOL {
            entries.push((CO_PLAYER_BASE + i, format!("Teammate{i}")));
        }
        let borrowed: Vec<(u64, &str)> = entries.iter().map(|(x, n)| (*x, n.as_str())).collect();
        Self::new(&borrowed)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileFetcher for Directory {
    async fn profile_by_gamertag(&self, _auth: &ProfileAuth, gamertag: &str) -> FetcherResult<PlayerProfile> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.entries
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(gamertag))
            .map(|(xuid, name)| PlayerProfile {
                xuid: *xuid,
                gamertag: name.clone(),
            })
            .ok_or_else(|| FetcherError::NotFound(gamertag.to_string()))
    }

    async fn profile_by_xuid(&self, _auth: &ProfileAuth, xuid: Xuid) -> FetcherResult<PlayerProfile> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.entries
            .get(&xuid)
            .map(|name| PlayerProfile {
                xuid,
                gamertag: name.clone(),
            })
            .ok_or_else(|| FetcherError::NotFound(xuid.to_wire()))
    }
}

/// Everything an aggregation needs, wired over fakes
pub struct Harness {
    pub cache: PersistentCache,
    pub store: Arc<MemoryStore>,
    pub exchange: Arc<StubExchange>,
    pub history: Arc<FakeHistory>,
    pub account: Account,
}

impl Harness {
    /// Harness over a memory store and a history of `matches`
    pub fn new(matches: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_cache(PersistentCache::new(store.clone()), store, matches)
    }

    pub fn with_cache(cache: PersistentCache, store: Arc<MemoryStore>, matches: usize) -> Self {
        let exchange = Arc::new(StubExchange::default());
        let account = account("primary", exchange.clone(), cache.clone());
        Self {
            cache,
            store,
            exchange,
            history: Arc::new(FakeHistory::with_matches(matches)),
            account,
        }
    }

    pub fn aggregator(&self) -> MatchAggregator {
        MatchAggregator::new(
            self.account.clone(),
            self.history.clone(),
            self.cache.clone(),
            AggregatorConfig::default().without_delays(),
        )
    }

    pub fn resolver(&self, directory: Arc<Directory>) -> Arc<IdentityResolver> {
        // Generous window so bulk resolution never sleeps
        let limiter = RateLimiter::new(1000, Duration::from_secs(10));
        let pool = AccountPool::new(vec![self.account.clone()], directory, limiter).unwrap();
        Arc::new(IdentityResolver::new(Arc::new(pool), self.cache.clone()))
    }
}

/// Account whose chain logs in with a one-shot code
pub fn account(id: &str, exchange: Arc<StubExchange>, cache: PersistentCache) -> Account {
    let chain = CredentialChain::new(id, exchange, Arc::new(AuthorizationCodeLogin::new("code")), cache);
    Account::new(id, chain)
}
