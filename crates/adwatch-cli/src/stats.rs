//! Read-only reporting over runs, ads and scrape errors.

use adwatch_core::ScrapeRun;
use clap::Subcommand;

/// Sub-commands available under `stats`.
#[derive(Debug, Subcommand)]
pub enum StatsCommands {
    /// Show the most recent scrape runs
    Runs {
        /// Maximum number of runs to show
        #[arg(long, default_value = "10")]
        limit: i64,
    },
    /// Summarise the ad inventory
    Ads {
        /// Rows shown in the per-competitor and recent-ad tables
        #[arg(long, default_value = "10")]
        limit: i64,
    },
    /// Show the most recent scrape errors
    Errors {
        /// Maximum number of errors to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

/// # Errors
///
/// Returns an error if any database query fails.
pub(crate) async fn run(pool: &sqlx::PgPool, command: StatsCommands) -> anyhow::Result<()> {
    match command {
        StatsCommands::Runs { limit } => show_runs(pool, limit).await,
        StatsCommands::Ads { limit } => show_ads(pool, limit).await,
        StatsCommands::Errors { limit } => show_errors(pool, limit).await,
    }
}

/// Truncates `text` to `max` characters, appending `...` when cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

fn fmt_duration(run: &ScrapeRun) -> String {
    run.completed_at.map_or_else(
        || "\u{2014}".to_string(),
        |done| format!("{}s", (done - run.started_at).num_seconds()),
    )
}

async fn show_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = adwatch_db::list_scrape_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no scrape runs yet; start one with `run`");
        return Ok(());
    }

    println!(
        "{:<7}{:<10}{:<11}{:<18}{:<10}{:<8}{:<8}{:<8}{:<9}ERRORS",
        "ID", "TYPE", "STATUS", "STARTED", "DURATION", "COMP", "FOUND", "NEW", "DELETED"
    );
    for run in &runs {
        let c = &run.counters;
        println!(
            "{:<7}{:<10}{:<11}{:<18}{:<10}{:<8}{:<8}{:<8}{:<9}{}",
            run.id,
            run.run_type.to_string(),
            run.status.to_string(),
            run.started_at.format("%Y-%m-%d %H:%M"),
            fmt_duration(run),
            format!("{}/{}", c.competitors_processed, c.competitors_total),
            c.ads_found,
            c.ads_new,
            c.ads_deleted,
            c.errors_count
        );
    }
    Ok(())
}

async fn show_ads(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let totals = adwatch_db::ad_totals(pool).await?;
    println!("Ads");
    println!("  total:     {}", totals.total);
    println!("  active:    {}", totals.active);
    println!("  inactive:  {}", totals.inactive);
    println!(
        "  winners:   {} (score >= {})",
        totals.winners,
        adwatch_engine::WINNER_SCORE
    );
    println!("  clustered: {}", totals.clustered);

    let by_type = adwatch_db::ads_by_media_type(pool).await?;
    if !by_type.is_empty() {
        println!();
        println!("{:<12}COUNT", "MEDIA TYPE");
        for row in &by_type {
            println!(
                "{:<12}{}",
                row.media_type.as_deref().unwrap_or("\u{2014}"),
                row.count
            );
        }
    }

    let by_competitor = adwatch_db::ads_by_competitor(pool, limit).await?;
    if !by_competitor.is_empty() {
        println!();
        println!("{:<22}{:<8}{:<8}NAME", "PAGE ID", "TOTAL", "ACTIVE");
        for row in &by_competitor {
            println!(
                "{:<22}{:<8}{:<8}{}",
                row.page_id, row.total, row.active, row.page_name
            );
        }
    }

    let recent = adwatch_db::recent_ads(pool, limit).await?;
    if !recent.is_empty() {
        println!();
        println!(
            "{:<22}{:<8}{:<8}{:<7}{:<18}COMPETITOR",
            "AD ID", "MEDIA", "ACTIVE", "SCORE", "FIRST SEEN"
        );
        for ad in &recent {
            println!(
                "{:<22}{:<8}{:<8}{:<7}{:<18}{}",
                ad.ad_id,
                ad.media_type.as_deref().unwrap_or("\u{2014}"),
                if ad.is_active { "yes" } else { "no" },
                ad.winner_score,
                ad.first_seen_at.format("%Y-%m-%d %H:%M"),
                ad.page_name.as_deref().unwrap_or("\u{2014}")
            );
        }
    }
    Ok(())
}

async fn show_errors(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let errors = adwatch_db::list_recent_errors(pool, limit).await?;
    if errors.is_empty() {
        println!("no scrape errors recorded");
        return Ok(());
    }

    println!(
        "{:<18}{:<7}{:<22}{:<16}{:<6}MESSAGE",
        "WHEN", "RUN", "PAGE ID", "TYPE", "TRY"
    );
    for e in &errors {
        println!(
            "{:<18}{:<7}{:<22}{:<16}{:<6}{}",
            e.created_at.format("%Y-%m-%d %H:%M"),
            e.scrape_run_id,
            e.page_id,
            e.error_type,
            e.retry_count,
            truncate(&e.error_message, 60)
        );
        if let Some(path) = &e.screenshot_path {
            println!("{:<18}screenshot: {path}", "");
        }
    }
    Ok(())
}
