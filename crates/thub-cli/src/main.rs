//! t-hub CLI - talk to the t-hub API with your single sign-on session.
//!
//! On start the stored session is restored silently (or refreshed), then the
//! requested command runs against the API with the access token attached.

mod app;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use thub_core::{bootstrap, Config, InitOptions, KeycloakClient, Session};

use app::App;

/// Log file name prefix when file logging is enabled
const LOG_FILE_PREFIX: &str = "thub.log";

#[derive(Debug, Parser)]
#[command(name = "thub", version, about = "t-hub API client with single sign-on")]
struct Cli {
    /// API base URL (overrides config and THUB_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show whether a session is active and when its token expires
    Status,
    /// Sign in through the identity provider
    Login,
    /// End the session
    Logout,
    /// GET a path and print the response
    Get { path: String },
    /// POST a JSON body to a path and print the response
    Post { path: String, body: String },
    /// DELETE a path
    Delete { path: String },
}

/// Initialize the tracing subscriber for logging.
/// RUST_LOG controls the level; RUST_LOG_FILE=<dir> also logs to a daily file.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("RUST_LOG_FILE") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!("t-hub CLI starting");

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    config.apply_env();
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }

    let cache_dir = config.cache_dir().context("Failed to locate session directory")?;
    let keycloak = Arc::new(
        KeycloakClient::new(&config, Session::new(cache_dir))
            .context("Failed to create identity provider client")?,
    );
    let options = InitOptions::for_context(config.is_secure_context());

    let app = bootstrap(keycloak, &options, |session| App::mount(config, session)).await?;
    app.run(cli.command).await
}
