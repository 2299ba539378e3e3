//! Deterministic demo data
//!
//! Builds a scripted provider holding three accounts and 120 days of
//! transactions (payroll, rent, groceries, dining, utilities, streaming, gym,
//! investment transfers). Seeding goes through the regular reconciler, so the
//! demo ledger is built exactly like a real one.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::models::{AccountSnapshot, DeltaPage, Link, LinkMetadata, NewLink, SyncStats, TransactionSnapshot};
use crate::provider::{LinkScript, ProviderClient, ScriptedProvider};
use crate::sync::Reconciler;

pub const DEMO_INSTITUTION_ID: &str = "demo_sandbox";
pub const DEMO_INSTITUTION_NAME: &str = "Ledgerline Demo Bank";

const HISTORY_DAYS: i64 = 120;
const PAGE_SIZE: usize = 50;

/// Result of seeding demo data
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoSeed {
    pub link: Link,
    pub stats: SyncStats,
}

pub fn demo_credential(user_id: &str) -> String {
    format!("demo-access-{}", user_id)
}

pub fn demo_new_link(user_id: &str) -> NewLink {
    NewLink {
        user_id: user_id.to_string(),
        external_id: format!("demo-item-{}", user_id),
        access_credential: demo_credential(user_id),
        institution_id: Some(DEMO_INSTITUTION_ID.to_string()),
        institution_name: Some(DEMO_INSTITUTION_NAME.to_string()),
    }
}

/// Scripted provider serving the demo link of `user_id`
pub fn demo_provider(user_id: &str, today: NaiveDate) -> ScriptedProvider {
    ScriptedProvider::new().with_link(&demo_credential(user_id), demo_script(user_id, today))
}

/// Accounts and delta pages of the demo link, ending at `today`
pub fn demo_script(user_id: &str, today: NaiveDate) -> LinkScript {
    let checking = format!("demo-{}-checking", user_id);
    let credit = format!("demo-{}-credit", user_id);
    let investment = format!("demo-{}-investment", user_id);

    let accounts = vec![
        demo_account(&checking, "Demo Checking", "0001", "depository", "checking", 7485.24, Some(7485.24)),
        demo_account(&credit, "Demo Rewards Card", "9001", "credit", "credit card", 1843.32, Some(5656.68)),
        demo_account(&investment, "Demo ETF Portfolio", "4301", "investment", "brokerage", 15240.45, None),
    ];

    let mut transactions = Vec::new();
    for days_ago in 0..HISTORY_DAYS {
        let date = today - Duration::days(days_ago);
        let seed = (days_ago + 41) as f64;
        let mut push = |kind: &str, account: &str, amount: f64, merchant: &str, name: &str, category: (&str, &str)| {
            transactions.push(demo_transaction(
                &format!("demo-{}-{}-{}", user_id, kind, days_ago),
                account,
                amount,
                date,
                merchant,
                name,
                category,
            ));
        };

        if days_ago % 14 == 0 {
            push("income", &checking, -3650.0, "Acme Technologies Payroll", "Payroll Deposit", ("INCOME", "INCOME_WAGES"));
        }
        if days_ago % 30 == 2 {
            push("rent", &checking, 1725.0, "Lakeside Apartments", "Apartment Rent", ("RENT_AND_UTILITIES", "RENT_AND_UTILITIES_RENT"));
        }
        if days_ago % 7 == 3 {
            let amount = 95.0 + (stable_fraction(seed) * 75.0).round();
            push("grocery", &credit, amount, "Whole Foods", "Grocery Purchase", ("FOOD_AND_DRINK", "FOOD_AND_DRINK_GROCERIES"));
        }
        if days_ago % 5 == 1 {
            let amount = 22.0 + (stable_fraction(seed * 3.0) * 58.0).round();
            push("dining", &credit, amount, "Urban Bites", "Restaurant", ("FOOD_AND_DRINK", "FOOD_AND_DRINK_RESTAURANT"));
        }
        if days_ago % 30 == 6 {
            push("electric", &checking, 148.45, "Austin Energy", "Electric Bill", ("RENT_AND_UTILITIES", "RENT_AND_UTILITIES_ELECTRIC"));
        }
        if days_ago % 30 == 8 {
            push("netflix", &credit, 15.99, "Netflix", "Netflix Subscription", ("ENTERTAINMENT", "ENTERTAINMENT_STREAMING"));
        }
        if days_ago % 30 == 10 {
            push("spotify", &credit, 11.99, "Spotify", "Spotify Premium", ("ENTERTAINMENT", "ENTERTAINMENT_STREAMING"));
        }
        if days_ago % 30 == 12 {
            push("gym", &credit, 49.0, "FitLife Gym", "Gym Membership", ("PERSONAL_CARE", "PERSONAL_CARE_GYM_AND_FITNESS"));
        }
        if days_ago % 30 == 13 {
            push("invest", &checking, 350.0, "Brokerage Transfer", "Investment Transfer", ("TRANSFER_OUT", "TRANSFER_OUT_INVESTMENT_AND_RETIREMENT_FUNDS"));
            push("invest-credit", &investment, -350.0, "Brokerage Transfer", "Investment Contribution", ("INCOME", "INCOME_OTHER_INCOME"));
        }
    }

    // Oldest first, the way a backfill arrives
    transactions.reverse();

    let chunks: Vec<Vec<TransactionSnapshot>> = transactions
        .chunks(PAGE_SIZE)
        .map(|chunk| chunk.to_vec())
        .collect();
    let page_count = chunks.len();
    let pages = chunks
        .into_iter()
        .enumerate()
        .map(|(i, added)| DeltaPage {
            added,
            next_cursor: format!("demo-cursor-{}", i + 1),
            has_more: i + 1 < page_count,
            ..Default::default()
        })
        .collect();

    LinkScript {
        accounts,
        pages,
        metadata: LinkMetadata {
            institution_id: Some(DEMO_INSTITUTION_ID.to_string()),
            institution_name: Some(DEMO_INSTITUTION_NAME.to_string()),
        },
    }
}

/// Register the demo link for `user_id` and sync it
///
/// Seeding twice is harmless: the second run resumes from the stored cursor
/// and finds nothing new.
pub async fn seed_demo_data(db: &Database, user_id: &str, today: NaiveDate) -> Result<DemoSeed> {
    let link = db.upsert_link(&demo_new_link(user_id))?;
    let provider = ProviderClient::Scripted(demo_provider(user_id, today));

    let stats = Reconciler::new(db.clone(), provider)
        .sync_link(user_id, link.id)
        .await?;
    info!(user_id, link_id = link.id, added = stats.added, "Seeded demo data");

    let link = db.get_link_for_user(user_id, link.id)?;
    Ok(DemoSeed { link, stats })
}

/// Deterministic value in [0, 1) derived from `seed`
fn stable_fraction(seed: f64) -> f64 {
    let x = seed.sin() * 10_000.0;
    x - x.floor()
}

fn demo_account(
    account_id: &str,
    name: &str,
    mask: &str,
    account_type: &str,
    subtype: &str,
    current: f64,
    available: Option<f64>,
) -> AccountSnapshot {
    AccountSnapshot {
        account_id: account_id.to_string(),
        name: name.to_string(),
        mask: Some(mask.to_string()),
        account_type: account_type.to_string(),
        subtype: Some(subtype.to_string()),
        current_balance: Some(current),
        available_balance: available,
        iso_currency_code: Some("USD".to_string()),
        unofficial_currency_code: None,
    }
}

fn demo_transaction(
    transaction_id: &str,
    account_id: &str,
    amount: f64,
    date: NaiveDate,
    merchant: &str,
    name: &str,
    (primary, detailed): (&str, &str),
) -> TransactionSnapshot {
    TransactionSnapshot {
        transaction_id: transaction_id.to_string(),
        account_id: account_id.to_string(),
        amount,
        date,
        authorized_date: Some(date),
        pending: false,
        pending_transaction_id: None,
        payment_channel: Some("online".to_string()),
        name: name.to_string(),
        merchant_name: Some(merchant.to_string()),
        primary_category: Some(primary.to_string()),
        detailed_category: Some(detailed.to_string()),
        iso_currency_code: Some("USD".to_string()),
        unofficial_currency_code: None,
        raw: json!({ "source": "demo-seed", "date": date.to_string() }),
    }
}
