mod competitors;
mod run;
mod stats;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::competitors::CompetitorsCommands;
use crate::stats::StatsCommands;

#[derive(Debug, Parser)]
#[command(name = "adwatch")]
#[command(about = "Competitor ad harvesting, reconciliation and winner scoring")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape competitors and reconcile their ads
    Run {
        /// Record the run as a deep historical backfill
        #[arg(long)]
        backfill: bool,

        /// Scrape a single competitor by page id
        #[arg(long)]
        competitor: Option<String>,
    },
    /// Recompute winner scores and scaling clusters for every ad
    Score,
    /// Manage tracked competitors
    Competitors {
        #[command(subcommand)]
        command: CompetitorsCommands,
    },
    /// Show run, ad and error statistics
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("adwatch: no command given; see `adwatch --help`");
        return Ok(ExitCode::SUCCESS);
    };

    let config = adwatch_core::load_app_config()?;
    init_tracing(&config.log_level)?;

    let pool_config = adwatch_db::PoolConfig::from_app_config(&config);
    let pool = adwatch_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Run {
            backfill,
            competitor,
        } => return run::run_scrape(&pool, &config, backfill, competitor.as_deref()).await,
        Commands::Score => {
            let store = adwatch_engine::PgStore::new(pool.clone());
            let stats = adwatch_engine::score_all_ads(&store).await?;
            println!(
                "scored {} of {} ads: {} winners (>= {}), {} top performers (>= {}), {} clusters",
                stats.scored,
                stats.total,
                stats.winners,
                adwatch_engine::WINNER_SCORE,
                stats.top_performers,
                adwatch_engine::TOP_PERFORMER_SCORE,
                stats.clusters_found
            );
        }
        Commands::Competitors { command } => competitors::run(&pool, command).await?,
        Commands::Stats { command } => stats::run(&pool, command).await?,
        Commands::Db { command } => match command {
            DbCommands::Migrate => {
                let applied = adwatch_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
            DbCommands::Ping => {
                adwatch_db::ping(&pool).await?;
                println!("database reachable");
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// `ADWATCH_LOG_LEVEL` wins; `RUST_LOG` is used when that value is not a
/// valid filter.
fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_new(log_level).or_else(|_| EnvFilter::try_from_default_env())?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

/// Marks a run `failed` with its last committed counters, logging instead of
/// propagating any error.
pub(crate) async fn fail_run_best_effort(pool: &sqlx::PgPool, run_id: i64) {
    let counters = match adwatch_db::get_scrape_run(pool, run_id).await {
        Ok(run) => run.counters,
        Err(e) => {
            tracing::error!(run_id, error = %e, "failed to load scrape run before failing it");
            adwatch_core::RunCounters::default()
        }
    };
    if let Err(e) = adwatch_db::fail_scrape_run(pool, run_id, &counters).await {
        tracing::error!(run_id, error = %e, "failed to mark scrape run as failed");
    }
}
