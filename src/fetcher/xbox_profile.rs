//! Xbox Live profile lookups

use crate::auth::ProfileAuth;
use crate::fetcher::parser::ProfileResponse;
use crate::fetcher::{FetcherResult, HaloHttpClient, PlayerProfile, ProfileFetcher};
use crate::identifier::Xuid;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::sync::Arc;

/// Profile fetcher backed by the Xbox Live profile service
pub struct XboxProfileFetcher {
    http: Arc<HaloHttpClient>,
}

impl XboxProfileFetcher {
    /// Fetcher sharing `http` with other clients
    pub fn new(http: Arc<HaloHttpClient>) -> Self {
        Self { http }
    }

    async fn lookup(&self, auth: &ProfileAuth, user: String) -> FetcherResult<PlayerProfile> {
        let url = self.http.endpoints().profile_url(&user);
        let header = auth.authorization_header();
        let response: ProfileResponse = self
            .http
            .send_json("profile_settings", |c| {
                c.get(&url)
                    .query(&[("settings", "Gamertag")])
                    .header(AUTHORIZATION, &header)
                    .header("x-xbl-contract-version", "2")
                    .header(ACCEPT, "application/json")
            })
            .await?;
        response.into_profile(&user)
    }
}

#[async_trait]
impl ProfileFetcher for XboxProfileFetcher {
    async fn profile_by_gamertag(&self, auth: &ProfileAuth, gamertag: &str) -> FetcherResult<PlayerProfile> {
        self.lookup(auth, format!("gt({gamertag})")).await
    }

    async fn profile_by_xuid(&self, auth: &ProfileAuth, xuid: Xuid) -> FetcherResult<PlayerProfile> {
        self.lookup(auth, xuid.to_wire()).await
    }
}
