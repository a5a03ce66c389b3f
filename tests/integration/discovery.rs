//! Integration tests for resumable co-player discovery

use crate::support::{player, Directory, FakeHistory, Harness, CO_PLAYER_BASE, CO_PLAYER_POOL};
use halo_stats::aggregator::MatchAggregator;
use halo_stats::cache::{keys, IdentityIndex, ScanProgress};
use halo_stats::discovery::{DiscoveryConfig, DiscoveryError, PlayerDiscovery};
use halo_stats::fetcher::PlayerProfile;
use halo_stats::{MatchCount, Xuid};
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "Spartan Main";

fn profile() -> PlayerProfile {
    PlayerProfile {
        xuid: player(),
        gamertag: NAME.to_string(),
    }
}

fn discovery(h: &Harness, directory: Arc<Directory>, matches: usize) -> PlayerDiscovery {
    PlayerDiscovery::new(
        Arc::new(h.aggregator()),
        h.account.clone(),
        h.history.clone(),
        h.resolver(directory),
        h.cache.clone(),
        DiscoveryConfig {
            matches,
            batch_size: 5,
            batch_delay: Duration::ZERO,
        },
    )
}

fn progress_key() -> String {
    keys::progress(&PlayerDiscovery::progress_name(player()))
}

fn co_player(i: u64) -> Xuid {
    Xuid::new(CO_PLAYER_BASE + i)
}

#[tokio::test]
async fn test_discovery_resolves_every_co_player() {
    let h = Harness::new(8);
    let directory = Arc::new(Directory::full());

    let report = discovery(&h, directory.clone(), 8).discover(&profile()).await.unwrap();

    assert_eq!(report.matches_scanned, 8);
    assert_eq!(report.players_found, CO_PLAYER_POOL as usize);
    assert_eq!(report.resolution.resolved, CO_PLAYER_POOL as usize);
    assert_eq!(report.resolution.failed, 0);
    let expected: Vec<String> = (0..CO_PLAYER_POOL).map(|i| format!("Teammate{i}")).collect();
    assert_eq!(report.gamertags, expected);

    let index = h.cache.load_identity_index().await.unwrap();
    assert_eq!(index.gamertag(co_player(3)), Some("Teammate3"));
    assert!(!index.contains(player()));
    assert!(!h.store.keys().contains(&progress_key()));
}

#[tokio::test]
async fn test_discovery_uses_cached_match_list() {
    let h = Harness::new(12);
    h.aggregator()
        .aggregate(player(), Some(NAME), MatchCount::Recent(12), false)
        .await
        .unwrap();
    let pages = h.history.page_calls();

    let report = discovery(&h, Arc::new(Directory::full()), 10)
        .discover(&profile())
        .await
        .unwrap();

    assert_eq!(report.matches_scanned, 10);
    assert_eq!(h.history.page_calls(), pages);
}

#[tokio::test]
async fn test_completed_scan_resumes_with_resolution_only() {
    let h = Harness::new(3);
    let directory = Arc::new(Directory::full());

    let mut saved = ScanProgress::new(3);
    saved.last_processed_index = 3;
    saved.completed_ids.extend(["m0", "m1", "m2"].map(String::from));
    saved.discovered_xuids.extend([co_player(0), co_player(1), co_player(2)]);
    saved.resolved_xuids.insert(co_player(0));
    h.cache
        .save_progress(&PlayerDiscovery::progress_name(player()), &saved)
        .await
        .unwrap();

    let report = discovery(&h, directory.clone(), 3).discover(&profile()).await.unwrap();

    assert_eq!(h.history.network_calls(), 0);
    assert_eq!(directory.lookups(), 2);
    assert_eq!(report.matches_scanned, 3);
    assert_eq!(report.players_found, 3);
    assert_eq!(report.resolution.resolved, 2);
    assert!(h.cache.load_progress(&PlayerDiscovery::progress_name(player())).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_session_saves_progress_for_rerun() {
    let h = Harness::new(10);
    h.aggregator()
        .aggregate(player(), Some(NAME), MatchCount::Recent(10), false)
        .await
        .unwrap();
    let directory = Arc::new(Directory::full());

    h.history.reject_next(1);
    let err = discovery(&h, directory.clone(), 10)
        .discover(&profile())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::SessionRejected));

    let saved = h
        .cache
        .load_progress(&PlayerDiscovery::progress_name(player()))
        .await
        .unwrap()
        .expect("progress saved");
    assert!(!saved.scan_complete());
    assert_eq!(saved.total_matches, 10);

    let report = discovery(&h, directory, 10).discover(&profile()).await.unwrap();
    assert_eq!(report.matches_scanned, 10);
    assert_eq!(report.players_found, CO_PLAYER_POOL as usize);
    assert!(!h.store.keys().contains(&progress_key()));
}

#[tokio::test]
async fn test_known_co_players_are_not_looked_up_again() {
    let h = Harness::new(6);
    let mut seed = IdentityIndex::new();
    for i in 0..CO_PLAYER_POOL {
        seed.insert(co_player(i), format!("Known{i}"));
    }
    h.cache.merge_identity_index(seed).await.unwrap();
    let directory = Arc::new(Directory::full());

    let report = discovery(&h, directory.clone(), 6).discover(&profile()).await.unwrap();

    assert_eq!(directory.lookups(), 0);
    assert_eq!(report.resolution.already_known, CO_PLAYER_POOL as usize);
    assert_eq!(report.gamertags[0], "Known0");
}

#[tokio::test]
async fn test_co_players_of_each_match_are_collected() {
    let detail_players = FakeHistory::co_players(7);
    assert_eq!(detail_players, [co_player(1), co_player(2)]);

    let h = Harness::new(2);
    let aggregator: Arc<MatchAggregator> = Arc::new(h.aggregator());
    let discovery = PlayerDiscovery::new(
        aggregator,
        h.account.clone(),
        h.history.clone(),
        h.resolver(Arc::new(Directory::full())),
        h.cache.clone(),
        DiscoveryConfig {
            matches: 2,
            ..DiscoveryConfig::default()
        },
    );
    let report = discovery.discover(&profile()).await.unwrap();

    // m0 brings co-players 0 and 1, m1 brings 1 and 2
    assert_eq!(report.players_found, 3);
    assert_eq!(report.gamertags, vec!["Teammate0", "Teammate1", "Teammate2"]);
}
