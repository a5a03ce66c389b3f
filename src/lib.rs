//! # Halo Stats Library
//!
//! Player statistics for Halo Infinite, built on top of the Xbox Live and
//! Halo Waypoint services.
//!
//! ## Features
//!
//! - **Credential Chain**: OAuth → Xbox user token → dual XSTS → Spartan token → clearance,
//!   re-deriving only the expired suffix and persisting after every stage
//! - **Identity Resolution**: gamertag ↔ XUID lookups spread round-robin across several
//!   accounts, each throttled by a sliding-window rate limiter
//! - **Incremental Aggregation**: match history is cached per player and only new matches
//!   are fetched on later runs
//! - **Atomic Persistence**: every cache file is written through a locked temp-file rename
//!
//! ## Quick Start
//!
//! ```no_run
//! use halo_stats::accounts::{Account, AccountPool, RateLimiter};
//! use halo_stats::aggregator::{AggregatorConfig, MatchAggregator};
//! use halo_stats::auth::{CredentialChain, NoLogin, XboxLiveExchange};
//! use halo_stats::cache::{FileStore, PersistentCache};
//! use halo_stats::fetcher::waypoint::WaypointFetcher;
//! use halo_stats::fetcher::xbox_profile::XboxProfileFetcher;
//! use halo_stats::fetcher::HaloHttpClient;
//! use halo_stats::MatchCount;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = PersistentCache::new(Arc::new(FileStore::new("halo_cache")));
//! let http = Arc::new(HaloHttpClient::new()?);
//! let exchange = Arc::new(XboxLiveExchange::new(http.clone(), "client-id", "secret"));
//! let chain = CredentialChain::new("account1", exchange, Arc::new(NoLogin), cache.clone());
//! let pool = Arc::new(AccountPool::new(
//!     vec![Account::new("account1", chain)],
//!     Arc::new(XboxProfileFetcher::new(http.clone())),
//!     RateLimiter::default(),
//! )?);
//!
//! let aggregator = MatchAggregator::new(
//!     pool.primary().clone(),
//!     Arc::new(WaypointFetcher::new(http)),
//!     cache,
//!     AggregatorConfig::default(),
//! );
//! let xuid = "2533274818160056".parse()?;
//! let report = aggregator.aggregate(xuid, Some("Example"), MatchCount::Recent(25), false).await?;
//! println!("{}", report.stats.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`identifier`] - XUID and gamertag parsing, cache key sanitization
//! - [`auth`] - Credential chain state machine and token exchanges
//! - [`accounts`] - Rate limiter, account pool and identity resolution
//! - [`fetcher`] - HTTP collaborators for Waypoint match data and Xbox profiles
//! - [`cache`] - Key-value persistence and typed cache records
//! - [`aggregator`] - Incremental match aggregation
//! - [`discovery`] - Resumable co-player discovery that fills the identity index

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account pool, rate limiting and identity resolution
pub mod accounts;

/// Match aggregation over cached and fetched history
pub mod aggregator;

/// Credential chain and token exchanges
pub mod auth;

/// Persistent key-value cache
pub mod cache;

/// CLI command implementations
pub mod cli;

/// Co-player discovery
pub mod discovery;

/// Network collaborators
pub mod fetcher;

/// Player identifiers
pub mod identifier;

/// Metrics collection
pub mod metrics;


pub use identifier::{Gamertag, IdentifierError, Xuid};

/// Outcome of a single match from the player's point of view
///
/// Serialized as the numeric code used by the stats service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Outcome {
    /// Match ended level
    Tie,
    /// Player's team won
    Win,
    /// Player's team lost
    Loss,
    /// Player left before the end
    DidNotFinish,
}

impl Outcome {
    /// Wire code for this outcome
    pub fn code(self) -> u8 {
        match self {
            Outcome::Tie => 1,
            Outcome::Win => 2,
            Outcome::Loss => 3,
            Outcome::DidNotFinish => 4,
        }
    }
}

impl TryFrom<u8> for Outcome {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Outcome::Tie),
            2 => Ok(Outcome::Win),
            3 => Ok(Outcome::Loss),
            4 => Ok(Outcome::DidNotFinish),
            other => Err(format!("unknown outcome code: {other}")),
        }
    }
}

impl From<Outcome> for u8 {
    fn from(outcome: Outcome) -> Self {
        outcome.code()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Tie => "tie",
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::DidNotFinish => "dnf",
        };
        f.write_str(label)
    }
}

/// One player's result in one match. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Match identifier (GUID string)
    pub match_id: String,
    /// Outcome for the player
    pub outcome: Outcome,
    /// Kills
    pub kills: u32,
    /// Deaths
    pub deaths: u32,
    /// Assists
    pub assists: u32,
    /// Match start time
    pub start_time: DateTime<Utc>,
    /// Match duration as reported by the service (ISO 8601 duration)
    pub duration: String,
}

/// Aggregate statistics over a set of matches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Sum of kills
    pub total_kills: u64,
    /// Sum of deaths
    pub total_deaths: u64,
    /// Sum of assists
    pub total_assists: u64,
    /// Matches won
    pub wins: u64,
    /// Matches lost
    pub losses: u64,
    /// Matches tied
    pub ties: u64,
    /// Matches left early
    pub dnf: u64,
    /// Number of matches counted
    pub games_played: u64,
    /// Kills per death, or kills when there are no deaths
    pub kd_ratio: f64,
    /// kills + assists/3 - deaths
    pub kda: f64,
    /// KDA per game
    pub avg_kda: f64,
    /// Wins as a percentage of games played
    pub win_rate: f64,
}

impl AggregateStats {
    /// Compute aggregates over a set of match records
    ///
    /// Ratios are rounded the way they are displayed: kd, kda and avg_kda to two
    /// decimals, win rate to one.
    pub fn from_matches(matches: &[MatchRecord]) -> Self {
        let mut stats = AggregateStats::default();

        for record in matches {
            stats.total_kills += u64::from(record.kills);
            stats.total_deaths += u64::from(record.deaths);
            stats.total_assists += u64::from(record.assists);
            match record.outcome {
                Outcome::Win => stats.wins += 1,
                Outcome::Loss => stats.losses += 1,
                Outcome::Tie => stats.ties += 1,
                Outcome::DidNotFinish => stats.dnf += 1,
            }
        }
        stats.games_played = matches.len() as u64;

        let kills = stats.total_kills as f64;
        let deaths = stats.total_deaths as f64;
        let assists = stats.total_assists as f64;

        stats.kd_ratio = if stats.total_deaths == 0 {
            kills
        } else {
            round_to(kills / deaths, 2)
        };
        let kda = kills + assists / 3.0 - deaths;
        stats.kda = round_to(kda, 2);

        if stats.games_played > 0 {
            let games = stats.games_played as f64;
            stats.avg_kda = round_to(kda / games, 2);
            stats.win_rate = round_to(stats.wins as f64 / games * 100.0, 1);
        }

        stats
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} games | {}W {}L {}T {}DNF | win rate {:.1}% | K/D {:.2} | KDA {:.2} (avg {:.2}) | {}/{}/{}",
            self.games_played,
            self.wins,
            self.losses,
            self.ties,
            self.dnf,
            self.win_rate,
            self.kd_ratio,
            self.kda,
            self.avg_kda,
            self.total_kills,
            self.total_deaths,
            self.total_assists,
        )
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// How many matches a caller wants aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchCount {
    /// The newest N matches
    Recent(usize),
    /// The entire match history
    All,
}

impl MatchCount {
    /// Requested count, or None for the full history
    pub fn limit(self) -> Option<usize> {
        match self {
            MatchCount::Recent(n) => Some(n),
            MatchCount::All => None,
        }
    }
}

impl fmt::Display for MatchCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchCount::Recent(n) => write!(f, "{n}"),
            MatchCount::All => f.write_str("all"),
        }
    }
}
