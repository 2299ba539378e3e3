//! Sync command implementation

use anyhow::{bail, Context, Result};
use ledgerline_core::{db::Database, BatchSyncReport, LedgerConfig, ProviderClient, Reconciler};
use tracing::info;

use super::print_json;

pub async fn cmd_sync(
    db: &Database,
    config: &LedgerConfig,
    user: &str,
    link: Option<i64>,
    json: bool,
) -> Result<()> {
    let provider = ProviderClient::from_config(&config.provider)
        .context("Provider is not configured")?;
    let reconciler = Reconciler::new(db.clone(), provider).with_config(&config.sync);

    run_sync(&reconciler, user, link, json).await
}

/// Sync one link, or every link of `user`, and report the outcome
///
/// Fails when any link failed, after printing what did succeed.
pub async fn run_sync(reconciler: &Reconciler, user: &str, link: Option<i64>, json: bool) -> Result<()> {
    let report = match link {
        Some(link_id) => {
            let stats = reconciler
                .sync_link_bounded(user, link_id)
                .await
                .with_context(|| format!("Sync of link #{} failed", link_id))?;
            BatchSyncReport {
                synced_links: 1,
                failed_links: Vec::new(),
                totals: stats,
            }
        }
        None => reconciler.sync_all_links_for_user(user).await?,
    };

    info!(
        user,
        synced = report.synced_links,
        failed = report.failed_links.len(),
        "Sync finished"
    );

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.is_complete() {
        bail!("{} link(s) failed to sync", report.failed_links.len());
    }
    Ok(())
}

fn print_report(report: &BatchSyncReport) {
    println!();
    println!("🔄 Sync Results");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Links synced:  {}", report.synced_links);
    println!("   Added:         {}", report.totals.added);
    println!("   Modified:      {}", report.totals.modified);
    println!("   Removed:       {}", report.totals.removed);

    if !report.failed_links.is_empty() {
        println!();
        println!("   ❌ Failed links:");
        for failure in &report.failed_links {
            let hint = if failure.retryable {
                "retry later"
            } else {
                "needs attention"
            };
            println!(
                "      #{} [{}] {} ({}; {} change(s) kept)",
                failure.link_id,
                failure.kind,
                failure.message,
                hint,
                failure.stats.total()
            );
        }
    }
    println!();
}
