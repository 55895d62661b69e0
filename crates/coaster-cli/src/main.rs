use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "coaster-cli")]
#[command(about = "Coaster stats cache: scrape batch driver and lookup service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Walk the configured ID range once and persist stat tables, manifest and credits.
    Scrape,
    /// Serve cached stats merged into live upstream records.
    Serve,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Scrape) {
        Commands::Scrape => {
            let summary = coaster_sync::run_scrape_once_from_env().await?;
            println!(
                "scrape complete: run_id={} attempted={} found={} not_found={} warnings={} failed={} images_downloaded={} images_skipped={} insertions={} tables={} persist_failures={} data={}",
                summary.run_id,
                summary.counters.attempted,
                summary.counters.found,
                summary.counters.not_found,
                summary.counters.upstream_warnings,
                summary.counters.failed,
                summary.counters.images_downloaded,
                summary.counters.images_skipped,
                summary.counters.stat_insertions,
                summary.tables_written,
                summary.persist_failures,
                summary.data_dir
            );
        }
        Commands::Serve => coaster_web::serve_from_env().await?,
    }

    Ok(())
}
