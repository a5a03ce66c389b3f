//! Command-line definition

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use super::login::LoginArgs;
use super::populate::PopulateArgs;
use super::reset::ResetArgs;
use super::stats::StatsArgs;

/// Upper bound accepted for `--matches`
const MAX_REQUESTED_MATCHES: usize = 10_000;

/// Parse a requested match count (1..=10000)
pub(crate) fn parse_match_count(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("match count must be at least 1".to_string());
    }
    if value > MAX_REQUESTED_MATCHES {
        return Err(format!(
            "match count {value} exceeds maximum of {MAX_REQUESTED_MATCHES}; use --all for the full history"
        ));
    }
    Ok(value)
}

/// Halo Infinite stats CLI
#[derive(Parser, Debug)]
#[command(name = "halo-stats")]
#[command(about = "Halo Infinite player statistics from the Waypoint match history", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Directory holding credentials, the identity index and player caches
    #[arg(long, global = true, default_value = "halo_cache")]
    pub cache_dir: PathBuf,

    /// Account used for API calls; repeat to spread profile lookups over several accounts.
    /// The first account also serves match history.
    #[arg(long = "account", global = true, default_value = "account1")]
    pub accounts: Vec<String>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Azure application id used for Microsoft account sign-in
    #[arg(long, global = true, env = "HALO_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// Azure application secret
    #[arg(long, global = true, env = "HALO_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate a player's match stats, fetching only what the cache lacks
    Stats(StatsArgs),

    /// Scan a player's recent matches and record every co-player's gamertag
    Populate(PopulateArgs),

    /// Print the sign-in URL, or store the authorization code it produced
    Login(LoginArgs),

    /// Delete a player's cached stats
    Reset(ResetArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}
