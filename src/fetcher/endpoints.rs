//! Service endpoint configuration
//!
//! All hosts live in one struct so a test or a proxy setup can point the
//! clients somewhere else without touching request code.

/// User agent the Halo services expect
pub const HALO_USER_AGENT: &str = "HaloWaypoint/6.1.0.0 (Windows10; Xbox; Production)";

/// Audience requested for the Spartan token
pub const SPARTAN_AUDIENCE: &str = "urn:343:s3:services";

/// Relying party whose XSTS token carries the XUID and user hash
pub const XBOX_RELYING_PARTY: &str = "http://xboxlive.com";

/// Relying party whose XSTS token is exchanged for a Spartan token
pub const HALO_RELYING_PARTY: &str = "https://prod.xsts.halowaypoint.com/";

/// Base URLs for every service the crate talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Microsoft account token endpoint
    pub oauth_token_url: String,
    /// Xbox Live user authentication endpoint
    pub user_auth_url: String,
    /// Xbox Live XSTS authorization endpoint
    pub xsts_url: String,
    /// Halo settings service (Spartan token, clearance)
    pub settings_base: String,
    /// Halo stats service (match history, match stats)
    pub stats_base: String,
    /// Xbox Live profile service
    pub profile_base: String,
}

impl Endpoints {
    /// Production endpoints
    pub fn production() -> Self {
        Self {
            oauth_token_url: "https://login.live.com/oauth20_token.srf".to_string(),
            user_auth_url: "https://user.auth.xboxlive.com/user/authenticate".to_string(),
            xsts_url: "https://xsts.auth.xboxlive.com/xsts/authorize".to_string(),
            settings_base: "https://settings.svc.halowaypoint.com".to_string(),
            stats_base: "https://halostats.svc.halowaypoint.com".to_string(),
            profile_base: "https://profile.xboxlive.com".to_string(),
        }
    }

    /// Spartan token exchange
    pub fn spartan_token_url(&self) -> String {
        format!("{}/spartan-token", self.settings_base)
    }

    /// Active flight configuration for a player
    pub fn clearance_url(&self, wire_xuid: &str) -> String {
        format!(
            "{}/oban/flight-configurations/titles/hi/audiences/RETAIL/players/{wire_xuid}/active",
            self.settings_base
        )
    }

    /// Match history page
    pub fn match_list_url(&self, wire_xuid: &str) -> String {
        format!("{}/hi/players/{wire_xuid}/matches", self.stats_base)
    }

    /// Match stats
    pub fn match_stats_url(&self, match_id: &str) -> String {
        format!("{}/hi/matches/{match_id}/stats", self.stats_base)
    }

    /// Profile settings lookup; `user` is `gt(name)` or `xuid(n)`
    pub fn profile_url(&self, user: &str) -> String {
        format!("{}/users/{user}/profile/settings", self.profile_base)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::production()
    }
}
