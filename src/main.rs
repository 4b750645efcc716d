use clap::Parser;
use std::time::Duration;
use teamdash::config;
use teamdash::core::cache::{CacheMode, QueryCache};
use teamdash::utils::{logger, validation::Validate};
use teamdash::{
    BugzillaClient, GithubClient, LocalStorage, ReportConfig, ReportEngine, ReportPipeline,
};

#[derive(Parser)]
#[command(name = "teamdash")]
#[command(about = "Static weekly activity reports from Bugzilla and GitHub")]
struct Args {
    /// Path to the TOML report configuration
    #[arg(short, long, default_value = "report.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Skip the on-disk query cache entirely for this run
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let config = match ReportConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config file '{}': {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    let mode = if args.no_cache {
        CacheMode::Bypass
    } else if config.cache.force || config::force_cache() {
        CacheMode::ForceAll
    } else {
        CacheMode::Normal
    };

    let bugzilla = BugzillaClient::new(
        &config.bugzilla.base_url,
        config::bugzilla_api_key(),
        QueryCache::new(config.cache.dir.as_str())?,
        mode,
        config.year(),
        Duration::from_secs(config.bugzilla.timeout_seconds),
    )?;
    let github = GithubClient::new(
        &config.github.base_url,
        config::github_credentials(),
        QueryCache::new(config.cache.dir.as_str())?,
        mode,
        Duration::from_secs(config.github.request_delay_seconds),
        Duration::from_secs(config.github.timeout_seconds),
    )?;
    let storage = LocalStorage::new(config.build.dir.clone());

    let engine = ReportEngine::new(ReportPipeline::new(config, bugzilla, github, storage));
    match engine.run().await {
        Ok(index) => {
            tracing::info!("Report ready: {}", index);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Report generation failed: {}", e);
            std::process::exit(1);
        }
    }
}
