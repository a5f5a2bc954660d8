use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jurisharvest::config::Settings;
use jurisharvest::context::HarvestContext;
use jurisharvest::metrics;

mod commands;

#[derive(Parser)]
#[command(
    name = "jurisharvest",
    version,
    about = "Fault-tolerant harvester for paginated court document sources",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML settings file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics when the command finishes
    #[arg(long, global = true, default_value = "false")]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a paginated JSON source into the document store
    Harvest(commands::HarvestArgs),

    /// Connect to the document store and make sure the index exists
    CheckStore {
        /// Give up connecting after this many seconds
        #[arg(long)]
        wait_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::from_env()?,
    };

    let log_format = cli.log_format.as_deref().unwrap_or(&settings.logging.format);
    setup_tracing(log_format, &settings.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    tracing::info!("jurisharvest starting");

    let ctx = HarvestContext::new(settings)?;

    match cli.command {
        Commands::Harvest(args) => {
            tracing::info!(
                source = %args.source,
                base = %args.base,
                start = args.start,
                end = ?args.end,
                replicas = ?args.replicas,
                dry_run = args.dry_run,
                "Starting harvest command"
            );
            let report = commands::harvest(ctx, args).await.inspect_err(|e| {
                tracing::error!(
                    category = e.category().label(),
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "Harvest failed"
                );
            })?;

            if report.gave_up() > 0 {
                print_metrics(cli.print_metrics);
                anyhow::bail!("{} runner(s) gave up", report.gave_up());
            }
        }

        Commands::CheckStore { wait_secs } => {
            tracing::info!(wait_secs = ?wait_secs, "Starting check-store command");
            commands::check_store(ctx.settings(), wait_secs.map(Duration::from_secs))
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        category = e.category().label(),
                        recoverable = e.is_recoverable(),
                        error = %e,
                        "Store check failed"
                    );
                })?;
        }
    }

    print_metrics(cli.print_metrics);
    tracing::info!("jurisharvest completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("jurisharvest=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("jurisharvest={level},warn"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn print_metrics(enabled: bool) {
    if !enabled {
        return;
    }
    match metrics::gather_metrics() {
        Ok(text) => println!("\n{text}"),
        Err(e) => tracing::warn!(error = %e, "Failed to gather metrics"),
    }
}
