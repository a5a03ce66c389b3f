//! Halo Waypoint match history and match stats

use crate::auth::SessionCredentials;
use crate::fetcher::parser::{MatchListResponse, MatchStatsResponse};
use crate::fetcher::{FetcherResult, HaloHttpClient, MatchDetail, MatchHistoryFetcher};
use crate::identifier::Xuid;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use tracing::debug;

/// Header carrying the Spartan token
pub const SPARTAN_HEADER: &str = "x-343-authorization-spartan";

/// Header carrying the flight clearance id
pub const CLEARANCE_HEADER: &str = "343-clearance";

/// Match data fetcher backed by the Halo stats service
pub struct WaypointFetcher {
    http: Arc<HaloHttpClient>,
}

impl WaypointFetcher {
    /// Fetcher sharing `http` (and its rate-limit pause) with other clients
    pub fn new(http: Arc<HaloHttpClient>) -> Self {
        Self { http }
    }

    fn authorized(client: &Client, url: &str, session: &SessionCredentials) -> RequestBuilder {
        let request = client
            .get(url)
            .header(SPARTAN_HEADER, &session.spartan_token)
            .header(ACCEPT, "application/json");
        if session.clearance.is_empty() {
            request
        } else {
            request.header(CLEARANCE_HEADER, &session.clearance)
        }
    }
}

#[async_trait]
impl MatchHistoryFetcher for WaypointFetcher {
    async fn fetch_match_page(
        &self,
        session: &SessionCredentials,
        xuid: Xuid,
        start: usize,
        count: usize,
    ) -> FetcherResult<Vec<String>> {
        let url = self.http.endpoints().match_list_url(&xuid.to_wire());
        let query = [("start", start.to_string()), ("count", count.to_string())];

        let page: MatchListResponse = self
            .http
            .send_json("match_list", |c| Self::authorized(c, &url, session).query(&query))
            .await?;
        let ids = page.into_ids();
        debug!(%xuid, start, count, received = ids.len(), "Fetched match page");
        Ok(ids)
    }

    async fn fetch_match_detail(
        &self,
        session: &SessionCredentials,
        match_id: &str,
    ) -> FetcherResult<MatchDetail> {
        let url = self.http.endpoints().match_stats_url(match_id);
        let response: MatchStatsResponse = self
            .http
            .send_json("match_stats", |c| Self::authorized(c, &url, session))
            .await?;
        Ok(MatchDetail::from_response(match_id, response))
    }
}
