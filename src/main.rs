use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use statscard::{Cache, Config, GitHubClient, StatsEngine};

#[derive(Parser)]
#[command(name = "statscard")]
#[command(about = "Deterministic GitHub statistics card generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (environment variables still apply on top)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch statistics and generate both SVG cards (the default)
    Generate {
        /// Output directory override
        #[arg(short, long)]
        output: Option<String>,

        /// Bypass the response cache for this run
        #[arg(long)]
        no_cache: bool,
    },

    /// Verify the configured credential against the API
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting statscard v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Generate {
        output: None,
        no_cache: false,
    }) {
        Commands::Generate { output, no_cache } => generate(config, output, no_cache).await,
        Commands::Check => check(config).await,
    }
}

/// Run the full pipeline and report the summary
async fn generate(mut config: Config, output: Option<String>, no_cache: bool) -> Result<()> {
    if let Some(output) = output {
        config.output.dir = output;
    }

    let token = Config::resolve_token()?;
    if let Some(username) = config.github.username.as_deref() {
        info!("Collecting GitHub statistics for {}", username);
    }

    let cache = if config.cache.enabled && !no_cache {
        match Cache::open_at(config.cache_path(), config.cache.max_age_hours) {
            Ok(cache) => Some(cache),
            // A broken cache downgrades to live fetches, never a failed run
            Err(e) => {
                tracing::warn!("Cache unavailable ({}), fetching live", e);
                None
            }
        }
    } else {
        None
    };

    let client = GitHubClient::new(&config, token, cache)
        .await
        .context("Failed to create GitHub client")?;

    let engine = StatsEngine::new(config, Arc::new(client));
    let summary = engine.run().await.context("Statistics run failed")?;

    println!(
        "Generated {} artifacts from {} repositories ({} included) in {:.2}s",
        summary.artifacts.len(),
        summary.fetched_repositories,
        summary.included_repositories,
        summary.duration.as_secs_f64()
    );

    Ok(())
}

/// Verify authentication without fetching any statistics
async fn check(config: Config) -> Result<()> {
    let token = Config::resolve_token()?;

    match GitHubClient::new(&config, token, None).await {
        Ok(client) => {
            println!("Authentication successful");
            println!("   Username: {}", client.username());
            println!("   Display name: {}", statscard::StatsSource::display_name(&client));
            Ok(())
        }
        Err(e) => {
            println!("Authentication failed: {}", e);
            anyhow::bail!("credential check failed")
        }
    }
}

/// Initialize the tracing subscriber
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("statscard=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("statscard=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}
