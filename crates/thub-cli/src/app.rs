//! The mounted application: runs one command with the restored session.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Method;
use tracing::debug;

use thub_core::utils::format_remaining;
use thub_core::{Config, IdentityProvider, KeycloakClient, SecuredApi};

use crate::Command;

pub struct App {
    config: Config,
    keycloak: Arc<KeycloakClient>,
    api: SecuredApi,
}

impl App {
    pub fn mount(config: Config, keycloak: Arc<KeycloakClient>) -> Result<Self> {
        let api = SecuredApi::new(&config, keycloak.clone()).context("Failed to create API client")?;
        debug!(api = api.base_url(), authenticated = keycloak.is_authenticated(), "App mounted");
        Ok(Self { config, keycloak, api })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Status => self.status(),
            Command::Login => self.login().await,
            Command::Logout => {
                self.keycloak.logout().await;
                println!("Logged out.");
                Ok(())
            }
            Command::Get { path } => self.call(Method::GET, &path, None).await,
            Command::Post { path, body } => {
                let body: serde_json::Value = serde_json::from_str(&body).context("Request body is not valid JSON")?;
                self.call(Method::POST, &path, Some(body)).await
            }
            Command::Delete { path } => self.call(Method::DELETE, &path, None).await,
        }
    }

    fn status(&self) -> Result<()> {
        println!("Identity provider: {} (realm {})", self.config.identity_url, self.config.realm);
        println!("API:               {}", self.api.base_url());
        match self.keycloak.session_data() {
            Some(data) => {
                println!("Session:           active");
                println!("Token expires:     {}", format_remaining(data.time_until_expiry()));
            }
            None => println!("Session:           none (run `thub login`)"),
        }
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        let request = self.keycloak.create_login_url();
        println!("Open this URL in your browser and sign in:\n\n  {}\n", request.url);
        print!("Paste the URL you were redirected to: ");
        io::stdout().flush()?;

        let mut callback = String::new();
        io::stdin()
            .lock()
            .read_line(&mut callback)
            .context("Failed to read redirect URL")?;

        self.keycloak
            .complete_login(&request, callback.trim())
            .await
            .context("Login failed")?;
        println!("Logged in.");
        Ok(())
    }

    async fn call(&self, method: Method, path: &str, body: Option<serde_json::Value>) -> Result<()> {
        let mut request = self.api.request(method, path);
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let response = self.api.send(request).await?;
        let response = SecuredApi::check_response(response).await?;
        let text = response.text().await.context("Failed to read response body")?;

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) if text.is_empty() => {}
            Err(_) => println!("{}", text),
        }
        Ok(())
    }
}
