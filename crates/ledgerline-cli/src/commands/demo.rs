//! Demo data command

use anyhow::{Context, Result};
use chrono::Utc;
use ledgerline_core::{db::Database, seed_demo_data};

use super::print_json;

pub async fn cmd_demo(db: &Database, user: &str, json: bool) -> Result<()> {
    let seed = seed_demo_data(db, user, Utc::now().date_naive())
        .await
        .context("Failed to seed demo data")?;

    if json {
        return print_json(&seed);
    }

    if seed.stats.total() == 0 {
        println!("✅ Demo data already present for '{}' (link #{})", user, seed.link.id);
    } else {
        println!(
            "✅ Seeded {} demo transactions for '{}' (link #{})",
            seed.stats.added, user, seed.link.id
        );
    }
    println!();
    println!("Try:");
    println!("  ledgerline dashboard --user {}", user);
    println!("  ledgerline subscriptions --user {}", user);
    Ok(())
}
