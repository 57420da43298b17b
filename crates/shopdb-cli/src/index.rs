//! `index` and `runs` command handlers.

use chrono::{DateTime, Utc};
use shopdb_assistant::{AssistantConfig, Indexer};
use shopdb_core::EntityKind;

/// Run (or preview) a vector index sync for `kinds`.
///
/// With `dry_run` the catalog is read and summarised but no index run is
/// recorded and neither TEI nor Qdrant is contacted.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read, the clients cannot be
/// built, or the index run fails.
pub(crate) async fn run_index_command(
    pool: &sqlx::PgPool,
    config: &shopdb_core::AppConfig,
    kinds: &[EntityKind],
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        for &kind in kinds {
            let docs = shopdb_assistant::collect_documents(pool, kind).await?;
            println!("dry-run: {kind}: {} document(s) to sync", docs.len());
        }
        return Ok(());
    }

    let indexer = Indexer::from_config(&AssistantConfig::from_app_config(config))?;
    let (run_id, stats) = shopdb_assistant::run_full_index(pool, &indexer, "cli", kinds).await?;

    println!(
        "index run {run_id} complete: {} indexed, {} unchanged, {} deleted",
        stats.indexed, stats.unchanged, stats.deleted
    );
    Ok(())
}

fn fmt_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Print the most recent index runs, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_list_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = shopdb_db::list_index_runs(pool, limit.clamp(1, 200)).await?;

    if runs.is_empty() {
        println!("no index runs recorded; run `shopdb-cli index` first");
        return Ok(());
    }

    println!(
        "{:<38}{:<11}{:<11}{:<21}{:<21}{:>9}",
        "RUN", "TRIGGER", "STATUS", "STARTED", "COMPLETED", "RECORDS"
    );
    for run in &runs {
        println!(
            "{:<38}{:<11}{:<11}{:<21}{:<21}{:>9}",
            run.public_id,
            run.trigger_source,
            run.status,
            fmt_timestamp(run.started_at),
            fmt_timestamp(run.completed_at),
            run.records_processed
        );
        if let Some(error) = &run.error_message {
            println!("  error: {error}");
        }
    }

    Ok(())
}
