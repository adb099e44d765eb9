//! Competitor registry commands.

use adwatch_core::Competitor;
use adwatch_db::DbError;
use clap::Subcommand;

/// Sub-commands available under `competitors`.
#[derive(Debug, Subcommand)]
pub enum CompetitorsCommands {
    /// Start tracking a competitor page
    Add {
        /// Ad-library page id
        page_id: String,
        /// Display name
        #[arg(long = "name")]
        page_name: String,
    },
    /// List every tracked competitor
    List,
    /// Include a competitor in full runs again
    Activate { page_id: String },
    /// Exclude a competitor from runs without deleting its ads
    Deactivate { page_id: String },
    /// Delete a competitor together with its ads and snapshots
    Delete { page_id: String },
}

/// # Errors
///
/// Returns an error if the page id is unknown (or already tracked, for
/// `add`) or the database query fails.
pub(crate) async fn run(pool: &sqlx::PgPool, command: CompetitorsCommands) -> anyhow::Result<()> {
    match command {
        CompetitorsCommands::Add { page_id, page_name } => {
            let competitor = adwatch_db::insert_competitor(pool, &page_id, &page_name).await?;
            println!(
                "added competitor {} ({})",
                competitor.page_id, competitor.page_name
            );
        }
        CompetitorsCommands::List => {
            let competitors = adwatch_db::list_competitors(pool).await?;
            print_competitors(&competitors);
        }
        CompetitorsCommands::Activate { page_id } => {
            let competitor = adwatch_db::set_competitor_active(pool, &page_id, true)
                .await
                .map_err(|e| not_found(e, &page_id))?;
            println!("activated competitor {}", competitor.page_id);
        }
        CompetitorsCommands::Deactivate { page_id } => {
            let competitor = adwatch_db::set_competitor_active(pool, &page_id, false)
                .await
                .map_err(|e| not_found(e, &page_id))?;
            println!("deactivated competitor {}", competitor.page_id);
        }
        CompetitorsCommands::Delete { page_id } => {
            let competitor = adwatch_db::delete_competitor(pool, &page_id)
                .await
                .map_err(|e| not_found(e, &page_id))?;
            println!(
                "deleted competitor {} ({}) and its ads",
                competitor.page_id, competitor.page_name
            );
        }
    }
    Ok(())
}

fn not_found(err: DbError, page_id: &str) -> anyhow::Error {
    match err {
        DbError::NotFound => anyhow::anyhow!("competitor '{page_id}' not found"),
        other => other.into(),
    }
}

fn print_competitors(competitors: &[Competitor]) {
    if competitors.is_empty() {
        println!("no competitors tracked; add one with `competitors add <PAGE_ID> --name <NAME>`");
        return;
    }

    println!("{:<22}{:<9}{:<12}NAME", "PAGE ID", "ACTIVE", "ADDED");
    for c in competitors {
        println!(
            "{:<22}{:<9}{:<12}{}",
            c.page_id,
            if c.is_active { "yes" } else { "no" },
            c.created_at.format("%Y-%m-%d"),
            c.page_name
        );
    }
}
