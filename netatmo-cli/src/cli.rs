use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use inquire::{Password, Text};
use netatmo_core::{Authenticator, Config, NetatmoClient};
use tracing::info;

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "netatmo", version, about = "Netatmo weather station CLI")]
pub struct Cli {
    /// Configuration file; defaults to the platform config directory.
    #[arg(short = 'f', long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store app credentials (client id/secret) and optionally the account username.
    Configure,

    /// Log in with username and password and remember the refresh token.
    Login,

    /// Log in through the browser consent page and remember the refresh token.
    Authorize {
        /// Redirect URI registered for the app.
        #[arg(long, default_value = "http://localhost:8080/callback")]
        redirect_uri: String,
    },

    /// Show every station and module with its latest readings.
    Show,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut cfg = self.load_config()?;

        match self.command {
            Command::Configure => {
                let client_id = Text::new("Client id:")
                    .with_initial_value(cfg.client_id.as_deref().unwrap_or_default())
                    .prompt()?;
                let client_secret = Password::new("Client secret:").without_confirmation().prompt()?;
                let username = Text::new("Username (optional, for `netatmo login`):")
                    .with_initial_value(cfg.username.as_deref().unwrap_or_default())
                    .prompt()?;

                cfg.set_credentials(client_id.trim().to_string(), client_secret.trim().to_string());
                cfg.username = Some(username.trim().to_string()).filter(|u| !u.is_empty());
                self.save_config(&cfg)?;
                println!("Configuration saved.");
            }
            Command::Login => {
                let client = NetatmoClient::new(Authenticator::new(cfg.credentials()?));

                let username = match cfg.username.clone() {
                    Some(u) => u,
                    None => Text::new("Username:").prompt()?,
                };
                let password = match cfg.password.clone() {
                    Some(p) => p,
                    None => Password::new("Password:").without_confirmation().prompt()?,
                };

                client
                    .login_with_password(&username, &password)
                    .await
                    .context("Password login failed")?;

                self.persist_refresh_token(&mut cfg, &client).await?;
                println!("Logged in as {username}.");
            }
            Command::Authorize { ref redirect_uri } => {
                let client = NetatmoClient::new(Authenticator::new(cfg.credentials()?));
                let state = uuid::Uuid::new_v4().simple().to_string();
                let request = client.authenticator().authorization_url(redirect_uri, &state);

                println!("Open this URL in a browser and grant access:\n\n  {}\n", request.url);
                println!("You will be redirected to {redirect_uri}?code=...&state=...");

                let code = Text::new("Value of `code`:").prompt()?;
                let returned_state = Text::new("Value of `state`:").prompt()?;

                client
                    .login_with_code(&request, code.trim(), returned_state.trim())
                    .await
                    .context("Authorization failed")?;

                self.persist_refresh_token(&mut cfg, &client).await?;
                println!("Authorized.");
            }
            Command::Show => {
                let auth = Authenticator::new(cfg.credentials()?);
                let refresh_token = cfg.refresh_token().ok_or_else(|| {
                    anyhow!(
                        "Not logged in.\n\
                         Hint: run `netatmo login` or `netatmo authorize` first."
                    )
                })?;

                let session = auth.restore_session(refresh_token);
                let client = NetatmoClient::with_session(auth, session);

                let result = client.read().await;
                // The refresh token may have rotated even if the fetch itself failed.
                self.persist_refresh_token(&mut cfg, &client).await?;

                let collection = match result {
                    Ok(dc) => dc,
                    Err(e) if e.is_auth_failure() => {
                        return Err(anyhow::Error::new(e).context(
                            "Session rejected.\nHint: run `netatmo login` or `netatmo authorize` again.",
                        ));
                    }
                    Err(e) => return Err(e).context("Failed to read station data"),
                };

                print!("{}", render::collection(&collection, chrono::Utc::now()));
            }
        }

        Ok(())
    }

    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }

    fn save_config(&self, cfg: &Config) -> Result<()> {
        match &self.config {
            Some(path) => cfg.save_to(path),
            None => cfg.save(),
        }
    }

    async fn persist_refresh_token(&self, cfg: &mut Config, client: &NetatmoClient) -> Result<()> {
        if cfg.store_refresh_token(client.refresh_token().await) {
            self.save_config(cfg)?;
            info!("refresh token saved");
        }
        Ok(())
    }
}
