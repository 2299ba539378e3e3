//! Subscription command implementations

use anyhow::Result;
use ledgerline_core::{
    db::Database, subscription_totals, DetectedSubscription, LedgerConfig, SubscriptionDetector,
    SubscriptionTotals,
};
use serde::Serialize;

use super::{money, print_json, truncate};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionReport<'a> {
    subscriptions: &'a [DetectedSubscription],
    totals: SubscriptionTotals,
}

pub fn cmd_subscriptions(db: &Database, config: &LedgerConfig, user: &str, json: bool) -> Result<()> {
    let subscriptions = SubscriptionDetector::with_config(db, config.detection.clone())
        .detect_subscriptions(user)?;
    let totals = subscription_totals(&subscriptions);

    if json {
        return print_json(&SubscriptionReport {
            subscriptions: &subscriptions,
            totals,
        });
    }

    if subscriptions.is_empty() {
        println!("No recurring charges detected. Sync more history with:");
        println!("  ledgerline sync");
        return Ok(());
    }

    println!();
    println!("📋 Detected Subscriptions");
    println!("   ─────────────────────────────────────────────────────────────");

    for sub in &subscriptions {
        println!(
            "   {:20} │ {:>9}/{:<8} │ {:>9}/mo │ next {} │ {:>3.0}%",
            truncate(&sub.merchant, 20),
            money(sub.average_amount),
            sub.cadence.as_str(),
            money(sub.estimated_monthly_cost),
            sub.next_expected_charge_date,
            sub.confidence * 100.0
        );
    }

    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Total: {}/month, {}/year",
        money(totals.estimated_monthly_cost),
        money(totals.estimated_yearly_cost)
    );
    println!();
    Ok(())
}

pub fn cmd_simulate_cancel(
    db: &Database,
    config: &LedgerConfig,
    user: &str,
    merchants: &[String],
    json: bool,
) -> Result<()> {
    let simulation = SubscriptionDetector::with_config(db, config.detection.clone())
        .simulate_cancellation(user, merchants)?;

    if json {
        return print_json(&simulation);
    }

    if simulation.merchants.is_empty() {
        println!("None of those merchants has a detected subscription.");
        println!("  See `ledgerline subscriptions` for what was found.");
        return Ok(());
    }

    println!();
    println!("✂️  Cancellation Simulation");
    println!("   ─────────────────────────────────────────────────────────────");
    for merchant in &simulation.merchants {
        println!("   - {}", merchant);
    }
    println!();
    println!("   Monthly savings: {}", money(simulation.monthly_savings));
    println!("   Yearly savings:  {}", money(simulation.yearly_savings));
    println!();
    Ok(())
}
