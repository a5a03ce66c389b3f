//! Stats command

use crate::aggregator::{AggregationReport, AggregatorConfig};
use crate::fetcher::PlayerProfile;
use crate::identifier::Gamertag;
use crate::MatchCount;
use clap::Parser;
use serde_json::json;
use tracing::info;

use super::context::{spinner, AppContext};
use super::{Cli, CliError, OutputFormat};

/// Matches aggregated when neither `--matches` nor `--all` is given
pub const DEFAULT_STATS_MATCHES: usize = 25;

/// Recent matches listed in human output
const RECENT_MATCHES_SHOWN: usize = 5;

/// Arguments for the stats command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Player gamertag
    pub gamertag: String,

    /// Number of most recent matches to aggregate (default: 25)
    #[arg(long, value_parser = super::args::parse_match_count, conflicts_with = "all")]
    pub matches: Option<usize>,

    /// Aggregate the entire match history
    #[arg(long, default_value_t = false)]
    pub all: bool,

    /// Ignore the cache and rescan the history from scratch
    #[arg(long, default_value_t = false)]
    pub force_full: bool,
}

impl StatsArgs {
    /// Requested match count
    pub fn match_count(&self) -> MatchCount {
        if self.all {
            MatchCount::All
        } else {
            MatchCount::Recent(self.matches.unwrap_or(DEFAULT_STATS_MATCHES))
        }
    }

    /// Execute the stats command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let gamertag = Gamertag::parse(&self.gamertag)?;
        let count = self.match_count();
        let ctx = AppContext::build(cli)?;

        let pb = spinner(format!("Resolving {gamertag}"), cli.output_format == OutputFormat::Human);
        let profile = ctx.resolver.resolve_gamertag(&gamertag).await?;

        pb.set_message(format!("Aggregating {count} matches for {}", profile.gamertag));
        let aggregator = ctx.aggregator(AggregatorConfig::default());
        let report = aggregator
            .aggregate(profile.xuid, Some(&profile.gamertag), count, self.force_full)
            .await;
        pb.finish_and_clear();
        let report = report?;

        info!(
            gamertag = %profile.gamertag,
            total = report.total_matches,
            new = report.new_matches,
            from_cache = report.from_cache,
            "Stats ready"
        );

        match cli.output_format {
            OutputFormat::Json => print_json(&profile, count, &report),
            OutputFormat::Human => print_human(&profile, &report),
        }
        Ok(())
    }
}

fn print_json(profile: &PlayerProfile, count: MatchCount, report: &AggregationReport) {
    let recent: Vec<_> = report.matches.iter().take(RECENT_MATCHES_SHOWN).collect();
    let output = json!({
        "gamertag": profile.gamertag,
        "xuid": profile.xuid.value(),
        "requested": count.to_string(),
        "stats": report.stats,
        "total_matches": report.total_matches,
        "new_matches": report.new_matches,
        "from_cache": report.from_cache,
        "incomplete": report.incomplete,
        "failed_matches": report.failed_matches,
        "recent_matches": recent,
    });
    println!("{output}");
}

fn print_human(profile: &PlayerProfile, report: &AggregationReport) {
    let stats = &report.stats;
    println!("\n{} ({})", profile.gamertag, profile.xuid);
    println!("Games played: {}", stats.games_played);
    println!(
        "Record: {}W {}L {}T {}DNF (win rate {:.1}%)",
        stats.wins, stats.losses, stats.ties, stats.dnf, stats.win_rate
    );
    println!(
        "Kills/Deaths/Assists: {}/{}/{}",
        stats.total_kills, stats.total_deaths, stats.total_assists
    );
    println!("K/D: {:.2}  KDA: {:.2}  Avg KDA: {:.2}", stats.kd_ratio, stats.kda, stats.avg_kda);

    if report.from_cache {
        println!("Source: cache ({} matches cached)", report.total_matches);
    } else {
        println!("New matches fetched: {}", report.new_matches);
    }
    if report.incomplete {
        println!(
            "Warning: {} match(es) could not be fetched and will be retried next run",
            report.failed_matches.len()
        );
    }

    if !report.matches.is_empty() {
        println!("\nRecent matches:");
        for record in report.matches.iter().take(RECENT_MATCHES_SHOWN) {
            println!(
                "  {}  {:<4} {:>3}/{:>3}/{:>3}  {}",
                record.start_time.format("%Y-%m-%d %H:%M"),
                record.outcome.to_string(),
                record.kills,
                record.deaths,
                record.assists,
                record.match_id
            );
        }
    }
}
