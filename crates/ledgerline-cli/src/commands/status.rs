//! Status, accounts, dashboard and insights command implementations

use std::path::Path;

use anyhow::Result;
use ledgerline_core::{
    db::{Database, DB_KEY_ENV},
    DashboardEngine, DashboardSummary, InsightEngine, InsightSeverity, LedgerConfig,
    TransactionFilter,
};

use super::{load_config, money, open_db, print_json, truncate};

pub fn cmd_status(db_path: &Path, config_path: Option<&Path>, user: &str, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Ledgerline Status");
    println!("   ─────────────────────────────────────────────────────────────");

    // Database path
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    // Check encryption status
    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    // Provider configuration
    match load_config(config_path) {
        Ok(config) => print_provider_status(&config),
        Err(e) => println!("   ❌ Config: {:#}", e),
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                let links = db.list_links_for_user(user).map(|l| l.len());
                let accounts = db.list_accounts_for_user(user).map(|a| a.len());
                let transactions = db.count_transactions(TransactionFilter::new().user_id(user));
                if let (Ok(links), Ok(accounts), Ok(transactions)) = (links, accounts, transactions) {
                    println!();
                    println!("   User: {}", user);
                    println!("   Links: {}", links);
                    println!("   Accounts: {}", accounts);
                    println!("   Transactions: {}", transactions);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

fn print_provider_status(config: &LedgerConfig) {
    let provider = &config.provider;
    println!(
        "   Provider: {} ({})",
        provider.environment.as_str(),
        provider.resolved_base_url()
    );
    if provider.client_id.is_some() && provider.secret.is_some() {
        println!("   🔑 Credentials: configured");
    } else {
        println!("   ⚠️  Credentials: missing (sync disabled)");
    }
}

pub fn cmd_accounts(db: &Database, user: &str, json: bool) -> Result<()> {
    let accounts = db.list_accounts_for_user(user)?;

    if json {
        return print_json(&accounts);
    }

    if accounts.is_empty() {
        println!("No accounts yet. Run `ledgerline sync` or `ledgerline demo`.");
        return Ok(());
    }

    println!();
    println!("🏦 Accounts");
    println!("   ─────────────────────────────────────────────────────────────");

    for account in accounts {
        let mask = account
            .mask
            .as_deref()
            .map(|m| format!("••{}", m))
            .unwrap_or_default();
        let available = account
            .available_balance
            .map(money)
            .unwrap_or_else(|| "-".to_string());

        println!(
            "   #{:<4} {:24} {:6} │ {:12} │ {:>12} │ avail {:>12}",
            account.id,
            truncate(&account.name, 24),
            mask,
            truncate(&account.account_type, 12),
            money(account.current_balance),
            available
        );
    }

    println!();
    Ok(())
}

pub fn cmd_dashboard(db: &Database, config: &LedgerConfig, user: &str, json: bool) -> Result<()> {
    let summary = DashboardEngine::with_detection_config(db, config.detection.clone())
        .dashboard_summary(user)?;

    if json {
        return print_json(&summary);
    }

    print_dashboard(&summary);
    Ok(())
}

fn print_dashboard(summary: &DashboardSummary) {
    let totals = &summary.totals;
    let flow = &summary.cash_flow;

    println!();
    println!("📊 Dashboard");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Net worth:       {:>12}", money(totals.net_worth));
    println!("   Assets:          {:>12}", money(totals.assets));
    println!("   Liabilities:     {:>12}", money(totals.liabilities));
    println!("   Cash:            {:>12}", money(totals.cash));
    println!("   Investments:     {:>12}", money(totals.investments));
    println!("   Accounts:        {:>12}", summary.accounts_count);

    println!();
    println!("   💵 This month");
    println!("   Income:          {:>12}", money(flow.month_income));
    println!("   Spend:           {:>12}", money(flow.month_spend));
    println!("   Net:             {:>12}", money(flow.month_net));
    match flow.spend_change_pct {
        Some(pct) => println!(
            "   vs last month:   {:>11.1}% ({})",
            pct,
            money(flow.previous_month_spend)
        ),
        None => println!("   vs last month:   {:>12}", "n/a"),
    }
    println!("   Daily outflow:   {:>12}", money(flow.avg_daily_outflow));
    println!("   30-day forecast: {:>12}", money(flow.projected_30d_outflow));

    println!();
    println!("   💳 Credit");
    println!("   Revolving:       {:>12}", money(summary.credit.revolving_balance));
    match summary.credit.utilization_pct {
        Some(pct) => println!("   Utilization:     {:>11.1}%", pct),
        None => println!("   Utilization:     {:>12}", "unavailable"),
    }

    println!();
    println!(
        "   🔁 Subscriptions: {} detected, {}/month",
        summary.subscriptions.detected_count,
        money(summary.subscriptions.estimated_monthly_total)
    );

    if !summary.top_spending_categories.is_empty() {
        println!();
        println!("   🏷️  Top categories this month");
        for category in &summary.top_spending_categories {
            println!(
                "   {:24} │ {:>10} │ {:>3} txns",
                truncate(&category.category, 24),
                money(category.amount),
                category.transaction_count
            );
        }
    }
    println!();
}

pub fn cmd_insights(db: &Database, config: &LedgerConfig, user: &str, json: bool) -> Result<()> {
    let insights = InsightEngine::with_detection_config(db, config.detection.clone())
        .insights_for_user(user)?;

    if json {
        return print_json(&insights);
    }

    if insights.is_empty() {
        println!("No insights yet. Sync some transactions first.");
        return Ok(());
    }

    println!();
    println!("💡 Insights");
    println!("   ─────────────────────────────────────────────────────────────");

    for card in insights {
        let icon = match card.severity {
            InsightSeverity::Info => "ℹ️ ",
            InsightSeverity::Success => "✅",
            InsightSeverity::Warning => "⚠️ ",
        };
        println!("   {} {} ({:.0}% confidence)", icon, card.title, card.confidence * 100.0);
        println!("      {}", card.message);
    }

    println!();
    Ok(())
}
