//! Reset command

use crate::discovery::PlayerDiscovery;
use crate::identifier::Gamertag;
use clap::Parser;
use serde_json::json;
use tracing::info;

use super::context::open_cache;
use super::{Cli, CliError, OutputFormat};

/// Arguments for the reset command
#[derive(Parser, Debug)]
pub struct ResetArgs {
    /// Player whose cached stats are deleted
    pub gamertag: String,
}

impl ResetArgs {
    /// Execute the reset command
    ///
    /// Works offline: the player is looked up in the identity index only.
    /// The player's identity stays in the index; their cached matches and
    /// any unfinished populate progress are deleted.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let gamertag = Gamertag::parse(&self.gamertag)?;
        let cache = open_cache(cli);
        let index = cache.load_identity_index().await?;

        let removed = match index.xuid_for(gamertag.as_str()) {
            Some(xuid) => {
                let name = index.gamertag(xuid).unwrap_or(gamertag.as_str()).to_string();
                let by_name = cache.reset_player(Some(&name), xuid).await?;
                let by_id = cache.reset_player(None, xuid).await?;
                cache.clear_progress(&PlayerDiscovery::progress_name(xuid)).await?;
                info!(gamertag = %name, %xuid, removed = by_name || by_id, "Player cache reset");
                by_name || by_id
            }
            None => false,
        };

        match cli.output_format {
            OutputFormat::Json => println!("{}", json!({ "gamertag": gamertag.as_str(), "removed": removed })),
            OutputFormat::Human if removed => println!("Cached stats for {gamertag} deleted"),
            OutputFormat::Human => println!("No cached stats for {gamertag}"),
        }
        Ok(())
    }
}
