//! Unit tests for aggregate statistics

use chrono::{TimeZone, Utc};
use halo_stats::{AggregateStats, MatchRecord, Outcome};

fn record(id: &str, outcome: Outcome, kills: u32, deaths: u32, assists: u32) -> MatchRecord {
    MatchRecord {
        match_id: id.to_string(),
        outcome,
        kills,
        deaths,
        assists,
        start_time: Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap(),
        duration: "PT12M30S".to_string(),
    }
}

#[test]
fn test_empty_history_is_all_zero() {
    let stats = AggregateStats::from_matches(&[]);
    assert_eq!(stats, AggregateStats::default());
    assert_eq!(stats.win_rate, 0.0);
}

#[test]
fn test_outcome_counts_sum_to_games_played() {
    let matches = vec![
        record("a", Outcome::Win, 10, 4, 6),
        record("b", Outcome::Loss, 7, 9, 3),
        record("c", Outcome::Tie, 5, 5, 0),
        record("d", Outcome::DidNotFinish, 1, 3, 0),
        record("e", Outcome::Win, 12, 6, 3),
    ];
    let stats = AggregateStats::from_matches(&matches);

    assert_eq!(stats.games_played, 5);
    assert_eq!(stats.wins, 2);
    assert_eq!(stats.losses, 1);
    assert_eq!(stats.ties, 1);
    assert_eq!(stats.dnf, 1);
    assert_eq!(stats.wins + stats.losses + stats.ties + stats.dnf, stats.games_played);
    assert_eq!(stats.win_rate, 40.0);
}

#[test]
fn test_ratios_are_rounded() {
    // 35 kills, 27 deaths, 12 assists over 5 games
    let matches = vec![
        record("a", Outcome::Win, 10, 4, 6),
        record("b", Outcome::Loss, 7, 9, 3),
        record("c", Outcome::Tie, 5, 5, 0),
        record("d", Outcome::DidNotFinish, 1, 3, 0),
        record("e", Outcome::Win, 12, 6, 3),
    ];
    let stats = AggregateStats::from_matches(&matches);

    assert_eq!(stats.total_kills, 35);
    assert_eq!(stats.total_deaths, 27);
    assert_eq!(stats.total_assists, 12);
    assert_eq!(stats.kd_ratio, 1.3);
    // 35 + 12/3 - 27
    assert_eq!(stats.kda, 12.0);
    assert_eq!(stats.avg_kda, 2.4);
}

#[test]
fn test_deathless_kd_is_kill_count() {
    let stats = AggregateStats::from_matches(&[record("a", Outcome::Win, 9, 0, 1)]);
    assert_eq!(stats.kd_ratio, 9.0);
    assert_eq!(stats.kda, 9.33);
    assert_eq!(stats.win_rate, 100.0);
}

#[test]
fn test_summary_mentions_every_outcome() {
    let stats = AggregateStats::from_matches(&[
        record("a", Outcome::Win, 3, 1, 0),
        record("b", Outcome::Loss, 2, 4, 0),
    ]);
    let summary = stats.summary();
    assert!(summary.starts_with("2 games | 1W 1L 0T 0DNF"));
    assert!(summary.contains("win rate 50.0%"));
    assert!(summary.ends_with("5/5/0"));
}

#[test]
fn test_outcome_wire_codes() {
    let record = record("a", Outcome::DidNotFinish, 0, 0, 0);
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["outcome"], 4);

    let bad = serde_json::json!({
        "match_id": "x",
        "outcome": 9,
        "kills": 0,
        "deaths": 0,
        "assists": 0,
        "start_time": "2024-03-01T20:00:00Z",
        "duration": "PT1M",
    });
    assert!(serde_json::from_value::<MatchRecord>(bad).is_err());
}
