//! Integration tests for incremental match aggregation

use crate::support::{player, Harness};
use halo_stats::aggregator::AggregateError;
use halo_stats::auth::Stage;
use halo_stats::cache::keys;
use halo_stats::{MatchCount, Xuid};
use std::collections::HashSet;
use std::sync::Arc;

const NAME: &str = "Spartan Main";

fn player_key() -> String {
    keys::player(Some(NAME), player())
}

#[tokio::test]
async fn test_first_run_scans_and_caches_newest_matches() {
    let h = Harness::new(40);
    let report = h
        .aggregator()
        .aggregate(player(), Some(NAME), MatchCount::Recent(30), false)
        .await
        .unwrap();

    assert_eq!(report.total_matches, 30);
    assert_eq!(report.new_matches, 30);
    assert!(!report.from_cache);
    assert!(!report.incomplete);
    assert_eq!(report.matches[0].match_id, "m39");
    assert_eq!(report.matches[29].match_id, "m10");
    assert_eq!(h.history.detail_calls(), 30);
    assert_eq!(h.store.write_count(&player_key()), 1);
}

#[tokio::test]
async fn test_covered_request_is_idempotent_without_network() {
    let h = Harness::new(40);
    let aggregator = h.aggregator();
    let first = aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(30), false)
        .await
        .unwrap();

    let network = h.history.network_calls();
    let exchanges = h.exchange.total_calls();
    let writes = h.store.write_count(&player_key());

    let second = aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(30), false)
        .await
        .unwrap();

    assert!(second.from_cache);
    assert_eq!(second.stats, first.stats);
    assert_eq!(second.matches, first.matches);
    assert_eq!(h.history.network_calls(), network);
    assert_eq!(h.exchange.total_calls(), exchanges);
    assert_eq!(h.store.write_count(&player_key()), writes);
}

#[tokio::test]
async fn test_five_new_matches_on_top_of_twenty_five_cached() {
    let h = Harness::new(25);
    let aggregator = h.aggregator();
    aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(25), false)
        .await
        .unwrap();

    h.history.play(5);
    let details = h.history.detail_calls();
    let writes = h.store.write_count(&player_key());

    let report = aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(30), false)
        .await
        .unwrap();

    assert_eq!(h.history.detail_calls() - details, 5);
    assert_eq!(h.store.write_count(&player_key()) - writes, 1);
    assert_eq!(report.total_matches, 30);
    assert_eq!(report.new_matches, 5);
    assert_eq!(report.matches[0].match_id, "m29");

    let stats = &report.stats;
    assert_eq!(stats.games_played, 30);
    assert_eq!(stats.wins + stats.losses + stats.ties + stats.dnf, stats.games_played);
    assert_eq!(stats.total_kills, 300);
}

#[tokio::test]
async fn test_full_history_with_nothing_new_leaves_cache_untouched() {
    let h = Harness::new(10);
    let aggregator = h.aggregator();
    let first = aggregator
        .aggregate(player(), Some(NAME), MatchCount::All, false)
        .await
        .unwrap();
    assert_eq!(first.total_matches, 10);

    let details = h.history.detail_calls();
    let writes = h.store.write_count(&player_key());
    let second = aggregator
        .aggregate(player(), Some(NAME), MatchCount::All, false)
        .await
        .unwrap();

    assert_eq!(second.total_matches, 10);
    assert_eq!(second.new_matches, 0);
    assert_eq!(second.stats, first.stats);
    assert_eq!(h.history.detail_calls(), details);
    assert_eq!(h.store.write_count(&player_key()), writes);
}

#[tokio::test]
async fn test_cached_count_never_shrinks_without_force_full() {
    let h = Harness::new(30);
    let aggregator = h.aggregator();
    aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(30), false)
        .await
        .unwrap();

    // A smaller request is answered from the whole cache
    let smaller = aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(10), false)
        .await
        .unwrap();
    assert!(smaller.from_cache);
    assert_eq!(smaller.total_matches, 30);
    assert_eq!(smaller.stats.games_played, 30);

    h.history.play(2);
    let grown = aggregator
        .aggregate(player(), Some(NAME), MatchCount::All, false)
        .await
        .unwrap();
    assert_eq!(grown.total_matches, 32);

    let rebuilt = aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(10), true)
        .await
        .unwrap();
    assert_eq!(rebuilt.total_matches, 10);
    assert_eq!(rebuilt.matches[0].match_id, "m31");
}

#[tokio::test]
async fn test_duplicate_listing_entries_are_fetched_once() {
    let h = Harness::new(30);
    // The service shifted a page while it was being read
    h.history.insert_listing(26, "m20");

    let report = h
        .aggregator()
        .aggregate(player(), Some(NAME), MatchCount::All, false)
        .await
        .unwrap();

    assert_eq!(report.total_matches, 30);
    assert_eq!(h.history.detail_calls(), 30);
    let unique: HashSet<&str> = report.matches.iter().map(|m| m.match_id.as_str()).collect();
    assert_eq!(unique.len(), report.matches.len());
}

#[tokio::test]
async fn test_failed_detail_is_reported_and_retried_next_run() {
    let h = Harness::new(25);
    let aggregator = h.aggregator();
    h.history.fail_detail("m3");

    let first = aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(25), false)
        .await
        .unwrap();
    assert!(first.incomplete);
    assert_eq!(first.failed_matches, vec!["m3".to_string()]);
    assert_eq!(first.total_matches, 24);
    assert_eq!(first.stats.games_played, 24);

    h.history.clear_failures();
    let details = h.history.detail_calls();
    let second = aggregator
        .aggregate(player(), Some(NAME), MatchCount::Recent(25), false)
        .await
        .unwrap();

    assert_eq!(h.history.detail_calls() - details, 1);
    assert!(!second.incomplete);
    assert!(second.failed_matches.is_empty());
    assert_eq!(second.total_matches, 25);
}

#[tokio::test]
async fn test_rejected_session_is_refreshed_once_and_retried() {
    let h = Harness::new(5);
    h.history.reject_next(1);

    let report = h
        .aggregator()
        .aggregate(player(), Some(NAME), MatchCount::Recent(5), false)
        .await
        .unwrap();

    assert_eq!(report.total_matches, 5);
    assert_eq!(h.history.page_calls(), 2);
    // initial derivation plus the forced refresh
    assert_eq!(h.exchange.xsts_calls(), 2);
}

#[tokio::test]
async fn test_second_rejection_surfaces_auth_failure() {
    let h = Harness::new(5);
    h.history.reject_next(10);

    let err = h
        .aggregator()
        .aggregate(player(), Some(NAME), MatchCount::Recent(5), false)
        .await
        .unwrap_err();

    assert!(matches!(err, AggregateError::AuthFailure(Stage::GameSession)));
    assert_eq!(h.history.page_calls(), 2);
    assert_eq!(h.exchange.xsts_calls(), 2);
    assert!(h.cache.load_player(Some(NAME), player()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_player_is_not_found() {
    let h = Harness::new(5);
    let err = h
        .aggregator()
        .aggregate(Xuid::new(5), None, MatchCount::Recent(5), false)
        .await
        .unwrap_err();
    assert!(matches!(err, AggregateError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_runs_for_one_player_fetch_once() {
    let h = Harness::new(10);
    let aggregator = Arc::new(h.aggregator());

    let a = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move {
            aggregator
                .aggregate(player(), Some(NAME), MatchCount::Recent(10), false)
                .await
        })
    };
    let b = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move {
            aggregator
                .aggregate(player(), Some(NAME), MatchCount::Recent(10), false)
                .await
        })
    };

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a.total_matches, 10);
    assert_eq!(b.total_matches, 10);
    assert_eq!(h.history.detail_calls(), 10);
    assert!(a.from_cache != b.from_cache);
}
