//! Populate command: fill the identity index from a player's co-players

use crate::aggregator::AggregatorConfig;
use crate::discovery::{DiscoveryConfig, PlayerDiscovery, DEFAULT_DISCOVERY_MATCHES};
use crate::identifier::Gamertag;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;

use super::context::{spinner, AppContext};
use super::{Cli, CliError, OutputFormat};

/// Arguments for the populate command
#[derive(Parser, Debug)]
pub struct PopulateArgs {
    /// Player whose recent matches are scanned
    pub gamertag: String,

    /// Number of recent matches to scan (default: 50)
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_MATCHES, value_parser = super::args::parse_match_count)]
    pub matches: usize,
}

impl PopulateArgs {
    /// Execute the populate command
    ///
    /// Interrupted runs resume from the saved progress record.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let gamertag = Gamertag::parse(&self.gamertag)?;
        let ctx = AppContext::build(cli)?;

        let pb = spinner(format!("Resolving {gamertag}"), cli.output_format == OutputFormat::Human);
        let profile = ctx.resolver.resolve_gamertag(&gamertag).await?;

        pb.set_message(format!(
            "Scanning {} recent matches of {} for co-players",
            self.matches, profile.gamertag
        ));
        let config = DiscoveryConfig {
            matches: self.matches,
            ..DiscoveryConfig::default()
        };
        let discovery = PlayerDiscovery::new(
            Arc::new(ctx.aggregator(AggregatorConfig::default())),
            ctx.pool.primary().clone(),
            ctx.fetcher.clone(),
            ctx.resolver.clone(),
            ctx.cache.clone(),
            config,
        );
        let report = discovery.discover(&profile).await;
        pb.finish_and_clear();
        let report = report?;

        match cli.output_format {
            OutputFormat::Json => {
                let output = json!({
                    "gamertag": profile.gamertag,
                    "xuid": profile.xuid.value(),
                    "matches_scanned": report.matches_scanned,
                    "players_found": report.players_found,
                    "resolved": report.resolution.resolved,
                    "already_known": report.resolution.already_known,
                    "failed": report.resolution.failed,
                    "gamertags": report.gamertags,
                });
                println!("{output}");
            }
            OutputFormat::Human => {
                println!("\nPopulate complete for {}", profile.gamertag);
                println!("Matches scanned: {}", report.matches_scanned);
                println!("Co-players found: {}", report.players_found);
                println!(
                    "Newly resolved: {}  Already known: {}  Failed: {}",
                    report.resolution.resolved, report.resolution.already_known, report.resolution.failed
                );
                if !report.gamertags.is_empty() {
                    println!("\nPlayers:");
                    for name in &report.gamertags {
                        println!("  {name}");
                    }
                }
            }
        }
        Ok(())
    }
}
