//! Response records for the Halo stats and Xbox profile services
//!
//! Only the fields this crate consumes are modeled. Anything else in the
//! payload is ignored.

use crate::fetcher::{FetcherError, FetcherResult, PlayerProfile};
use crate::identifier::Xuid;
use crate::{MatchRecord, Outcome};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One page of match history
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchListResponse {
    /// Matches on this page, newest first
    #[serde(default)]
    pub results: Vec<MatchListEntry>,
}

/// Entry of a match history page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchListEntry {
    /// Match id
    pub match_id: String,
}

impl MatchListResponse {
    /// Match ids in page order
    pub fn into_ids(self) -> Vec<String> {
        self.results.into_iter().map(|m| m.match_id).collect()
    }
}

/// Match stats payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchStatsResponse {
    #[serde(default)]
    match_id: Option<String>,
    match_info: WireMatchInfo,
    #[serde(default)]
    players: Vec<WirePlayer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMatchInfo {
    start_time: DateTime<Utc>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WirePlayer {
    player_id: String,
    outcome: u8,
    #[serde(default)]
    player_team_stats: Vec<WireTeamStats>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTeamStats {
    stats: WireStats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireStats {
    core_stats: WireCoreStats,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCoreStats {
    kills: u32,
    deaths: u32,
    assists: u32,
}

/// Parsed match results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDetail {
    /// Match id
    pub match_id: String,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// ISO 8601 duration
    pub duration: String,
    /// Every participant, bots included
    pub players: Vec<PlayerResult>,
}

/// One participant's line in a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerResult {
    /// Raw id, `xuid(N)` for humans and `bid(...)` for bots
    pub player_id: String,
    /// Parsed id for human players
    pub xuid: Option<Xuid>,
    /// Raw outcome code
    pub outcome_code: u8,
    /// Kills/deaths/assists, absent when the service sent no team stats
    pub core: Option<(u32, u32, u32)>,
}

impl MatchDetail {
    /// Build from a stats payload; `requested_id` fills in a missing id
    pub fn from_response(requested_id: &str, response: MatchStatsResponse) -> Self {
        let players = response
            .players
            .into_iter()
            .map(|p| PlayerResult {
                xuid: p.player_id.parse().ok(),
                core: p
                    .player_team_stats
                    .first()
                    .map(|t| (t.stats.core_stats.kills, t.stats.core_stats.deaths, t.stats.core_stats.assists)),
                player_id: p.player_id,
                outcome_code: p.outcome,
            })
            .collect();

        Self {
            match_id: response.match_id.unwrap_or_else(|| requested_id.to_string()),
            start_time: response.match_info.start_time,
            duration: response
                .match_info
                .duration
                .unwrap_or_else(|| "Unknown".to_string()),
            players,
        }
    }

    /// The given player's record, or None if they are not in the match
    ///
    /// # Errors
    /// `CorruptResponse` if the player's outcome code is unknown or their
    /// stats are missing
    pub fn record_for(&self, xuid: Xuid) -> FetcherResult<Option<MatchRecord>> {
        let Some(player) = self.players.iter().find(|p| p.xuid == Some(xuid)) else {
            return Ok(None);
        };

        let outcome = Outcome::try_from(player.outcome_code).map_err(|e| {
            FetcherError::CorruptResponse(format!("match {}: {e}", self.match_id))
        })?;
        let (kills, deaths, assists) = player.core.ok_or_else(|| {
            FetcherError::CorruptResponse(format!("match {}: no core stats for {xuid}", self.match_id))
        })?;

        Ok(Some(MatchRecord {
            match_id: self.match_id.clone(),
            outcome,
            kills,
            deaths,
            assists,
            start_time: self.start_time,
            duration: self.duration.clone(),
        }))
    }

    /// Ids of every human participant
    pub fn player_xuids(&self) -> Vec<Xuid> {
        self.players.iter().filter_map(|p| p.xuid).collect()
    }
}

/// Xbox profile settings payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(default)]
    profile_users: Vec<WireProfileUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireProfileUser {
    id: String,
    #[serde(default)]
    settings: Vec<WireSetting>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireSetting {
    id: String,
    value: String,
}

impl ProfileResponse {
    /// First profile in the payload
    ///
    /// # Errors
    /// `NotFound` when the payload holds no profile, `CorruptResponse` when
    /// the id or gamertag is unusable
    pub fn into_profile(self, lookup: &str) -> FetcherResult<PlayerProfile> {
        let user = self
            .profile_users
            .into_iter()
            .next()
            .ok_or_else(|| FetcherError::NotFound(lookup.to_string()))?;

        let xuid: Xuid = user
            .id
            .parse()
            .map_err(|e| FetcherError::CorruptResponse(format!("profile {lookup}: {e}")))?;
        let gamertag = user
            .settings
            .into_iter()
            .find(|s| s.id == "Gamertag")
            .map(|s| s.value)
            .ok_or_else(|| FetcherError::CorruptResponse(format!("profile {lookup}: no Gamertag setting")))?;

        Ok(PlayerProfile { xuid, gamertag })
    }
}
