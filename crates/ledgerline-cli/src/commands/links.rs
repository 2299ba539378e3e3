//! Link command implementations

use anyhow::{Context, Result};
use ledgerline_core::{db::Database, NewLink};

use super::{print_json, truncate};

pub fn cmd_link_add(
    db: &Database,
    user: &str,
    external_id: &str,
    access_token: &str,
    institution_id: Option<&str>,
    institution_name: Option<&str>,
    json: bool,
) -> Result<()> {
    let link = db
        .upsert_link(&NewLink {
            user_id: user.to_string(),
            external_id: external_id.to_string(),
            access_credential: access_token.to_string(),
            institution_id: institution_id.map(str::to_string),
            institution_name: institution_name.map(str::to_string),
        })
        .context("Failed to register link")?;

    if json {
        return print_json(&link);
    }

    println!("✅ Registered link #{} ({})", link.id, link.external_id);
    if link.cursor.is_some() {
        println!("   Existing sync position kept");
    } else {
        println!("   Run `ledgerline sync --link {}` to backfill transactions", link.id);
    }
    Ok(())
}

pub fn cmd_links(db: &Database, user: &str, json: bool) -> Result<()> {
    let links = db.list_links_for_user(user)?;

    if json {
        return print_json(&links);
    }

    if links.is_empty() {
        println!("No links registered. Run:");
        println!("  ledgerline link add --external-id ITEM --access-token TOKEN");
        return Ok(());
    }

    println!();
    println!("🔗 Links");
    println!("   ─────────────────────────────────────────────────────────────");

    for link in links {
        let institution = link
            .institution_name
            .as_deref()
            .or(link.institution_id.as_deref())
            .unwrap_or("(unknown institution)");
        let synced = link
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        let cursor = link.cursor.as_deref().unwrap_or("(backfill pending)");

        println!(
            "   #{:<4} {:24} │ {:20} │ cursor {:20} │ synced {}",
            link.id,
            truncate(institution, 24),
            truncate(&link.external_id, 20),
            truncate(cursor, 20),
            synced
        );
    }

    println!();
    Ok(())
}
