//! Login command
//!
//! Without `--code` this prints the Microsoft sign-in URL. After signing in
//! the browser is redirected to the application's redirect URI with a `code`
//! query parameter; passing that code back stores the account's OAuth root
//! so later commands derive everything else from its refresh token.

use crate::auth::{authorize_url, CredentialChain, NoLogin, Stage, XboxLiveExchange};
use crate::fetcher::HaloHttpClient;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::context::{oauth_settings, open_cache, spinner};
use super::{Cli, CliError, OutputFormat};

/// Arguments for the login command
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Account id the credentials are stored under
    pub account: String,

    /// Authorization code from the sign-in redirect
    #[arg(long)]
    pub code: Option<String>,
}

impl LoginArgs {
    /// Execute the login command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        if self.account.trim().is_empty() {
            return Err(CliError::InvalidArgument("account id must not be empty".to_string()));
        }
        let settings = oauth_settings(cli)?;

        let Some(code) = self.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
            let url = authorize_url(&settings.client_id, &settings.redirect_uri)?;
            match cli.output_format {
                OutputFormat::Json => println!("{}", json!({ "account": self.account, "authorize_url": url })),
                OutputFormat::Human => {
                    println!("Open this URL and sign in with the account '{}':\n", self.account);
                    println!("  {url}\n");
                    println!("Then run: halo-stats login {} --code <code from the redirect URL>", self.account);
                }
            }
            return Ok(());
        };

        let cache = open_cache(cli);
        let http = Arc::new(HaloHttpClient::new()?);
        let exchange = Arc::new(XboxLiveExchange::with_settings(http, settings));
        let chain = CredentialChain::new(self.account.clone(), exchange, Arc::new(NoLogin), cache);

        let pb = spinner("Signing in", cli.output_format == OutputFormat::Human);
        let result = async {
            chain.store_grant(code).await?;
            chain.ensure(Stage::Clearance).await
        }
        .await;
        pb.finish_and_clear();
        let clearance = result?;

        let xuid = chain
            .snapshot()
            .await?
            .get(&Stage::XstsGame)
            .and_then(|c| c.xuid);
        info!(account = %self.account, "Login stored");

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "account": self.account,
                    "xuid": xuid.map(|x| x.value()),
                    "expires_at": clearance.expires_at,
                })
            ),
            OutputFormat::Human => {
                println!("Account '{}' signed in", self.account);
                if let Some(xuid) = xuid {
                    println!("XUID: {xuid}");
                }
                println!("Session valid until {}", clearance.expires_at.format("%Y-%m-%d %H:%M UTC"));
            }
        }
        Ok(())
    }
}
