//! `run` command: one scrape run over the selected competitors.

use std::process::ExitCode;
use std::sync::Arc;

use adwatch_core::{AppConfig, RunKind, ScrapeRun};
use adwatch_engine::{AdStore, CompetitorSelector, PgStore, RunController};
use adwatch_scraper::{AdScraper, AdSourceClient};
use chrono::{TimeDelta, Utc};

use crate::fail_run_best_effort;

/// Exit status after Ctrl-C.
const INTERRUPTED: u8 = 130;

/// Run kind recorded for a given set of CLI flags. A single competitor wins
/// over `--backfill`.
pub(crate) fn run_kind(backfill: bool, competitor: Option<&str>) -> RunKind {
    if competitor.is_some() {
        RunKind::Single
    } else if backfill {
        RunKind::Backfill
    } else {
        RunKind::Full
    }
}

pub(crate) fn run_metadata(backfill: bool, competitor: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "cli_args": {
            "backfill": backfill,
            "competitor": competitor,
        }
    })
}

/// Executes one run and prints its summary whatever the outcome.
///
/// Returns exit code 0 on success, 1 on a failed run and 130 when
/// interrupted.
///
/// # Errors
///
/// Returns an error if stale runs cannot be reconciled, the clients cannot
/// be built, or the run record cannot be created.
pub(crate) async fn run_scrape(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    backfill: bool,
    competitor: Option<&str>,
) -> anyhow::Result<ExitCode> {
    abandon_stale_runs(pool, config.stale_run_hours).await?;

    let kind = run_kind(backfill, competitor);
    let selector = competitor.map_or(CompetitorSelector::All, |page_id| {
        CompetitorSelector::One(page_id.to_string())
    });

    let scraper = AdSourceClient::new(
        &config.scraper_base_url,
        config.scraper_request_timeout_secs,
        &config.user_agent,
    )?;
    let controller = RunController::from_config(
        Arc::new(PgStore::new(pool.clone())) as Arc<dyn AdStore>,
        Arc::new(scraper) as Arc<dyn AdScraper>,
        config,
    )?;

    match competitor {
        Some(page_id) => println!("starting single competitor scrape: {page_id}"),
        None if backfill => println!("starting backfill scrape..."),
        None => println!("starting full scrape..."),
    }

    let run = controller
        .start_run(kind, &run_metadata(backfill, competitor))
        .await?;

    let code = tokio::select! {
        result = controller.execute(&run, &selector) => match result {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("scrape run {} failed: {err:#}", run.id);
                ExitCode::FAILURE
            }
        },
        () = interrupted() => {
            eprintln!("\nscrape run {} interrupted by user", run.id);
            fail_run_best_effort(pool, run.id).await;
            ExitCode::from(INTERRUPTED)
        }
    };

    match adwatch_db::get_scrape_run(pool, run.id).await {
        Ok(finished) => print_summary(&finished),
        Err(e) => eprintln!("could not load summary for scrape run {}: {e}", run.id),
    }
    Ok(code)
}

/// Fails every run left `running` for longer than `max_age_hours`.
async fn abandon_stale_runs(pool: &sqlx::PgPool, max_age_hours: u64) -> anyhow::Result<()> {
    let Some(cutoff) = i64::try_from(max_age_hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
        return Ok(());
    };

    let abandoned = adwatch_db::abandon_stale_runs(pool, cutoff).await?;
    if abandoned > 0 {
        tracing::warn!(abandoned, max_age_hours, "marked stale running scrape runs as failed");
    }
    Ok(())
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn print_summary(run: &ScrapeRun) {
    let duration = run.completed_at.map_or_else(
        || "n/a".to_string(),
        |done| format!("{}s", (done - run.started_at).num_seconds()),
    );
    let c = &run.counters;

    println!();
    println!("Run #{} ({}) {} in {duration}", run.id, run.run_type, run.status);
    println!(
        "  competitors: {} total, {} processed, {} failed",
        c.competitors_total, c.competitors_processed, c.competitors_failed
    );
    println!(
        "  ads:         {} found, {} new, {} updated, {} deleted",
        c.ads_found, c.ads_new, c.ads_updated, c.ads_deleted
    );
    println!("  media:       {} downloaded", c.media_downloaded);
    println!("  errors:      {}", c.errors_count);
}
