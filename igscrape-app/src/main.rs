use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use igscrape_common::ScrapeMode;
use igscrape_common::observability::init_logging;
use igscrape_config::{ScraperConfig, ScraperConfigLoader};
use std::path::PathBuf;
mod wiring;

#[derive(Debug, Parser)]
#[command(name = "igscrape", version, about = "Scrape Instagram posts and stories into SQL tables")]
struct Cli {
    /// YAML configuration file; `IGSCRAPE__*` environment variables override it.
    #[arg(long, global = true, env = "IGSCRAPE_CONFIG", default_value = "igscrape.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace the posts and/or stories tables with freshly scraped rows.
    Scrape {
        /// One of all, story, post.
        #[arg(default_value = "all")]
        media_type: ScrapeMode,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let cfg: ScraperConfig = ScraperConfigLoader::new()
        .with_file(&cli.config)
        .load()
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let log_dir = init_logging(cfg.logging.to_log_config())?;
    tracing::debug!(log_dir = %log_dir.display(), config = %cli.config.display(), "app.start");

    match cli.command {
        Command::Scrape { media_type } => {
            wiring::scrape(&cfg, media_type).await?;
            println!("Done Instagram scraping, mode={media_type}");
        }
    }
    Ok(())
}
