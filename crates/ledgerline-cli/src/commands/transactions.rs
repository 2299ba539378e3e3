//! Transaction command implementations

use anyhow::{bail, Result};
use chrono::NaiveDate;
use ledgerline_core::{db::Database, Transaction, TransactionFilter};
use serde::Serialize;

use super::{money, print_json, truncate};

/// Filters and paging for `ledgerline transactions`
#[derive(Debug, Clone)]
pub struct TransactionQuery {
    pub account: Option<i64>,
    pub category: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// 1-based
    pub page: i64,
    pub page_size: i64,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            account: None,
            category: None,
            from: None,
            to: None,
            page: 1,
            page_size: 25,
        }
    }
}

impl TransactionQuery {
    fn filter<'q>(&'q self, user: &'q str) -> TransactionFilter<'q> {
        TransactionFilter::new()
            .user_id(user)
            .account_id(self.account)
            .category(self.category.as_deref())
            .since(self.from)
            .until(self.to)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Run the query and return one page plus the total match count
pub fn query_transactions(db: &Database, user: &str, query: &TransactionQuery) -> Result<TransactionPage> {
    if query.page < 1 {
        bail!("--page must be at least 1");
    }
    if query.page_size < 1 {
        bail!("--page-size must be at least 1");
    }
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            bail!("--from {} is after --to {}", from, to);
        }
    }

    let total = db.count_transactions(query.filter(user))?;
    let offset = (query.page - 1) * query.page_size;
    let transactions = db.list_transactions(query.filter(user), Some(query.page_size), offset)?;

    Ok(TransactionPage {
        transactions,
        page: query.page,
        page_size: query.page_size,
        total,
    })
}

pub fn cmd_transactions(db: &Database, user: &str, query: &TransactionQuery, json: bool) -> Result<()> {
    let page = query_transactions(db, user, query)?;

    if json {
        return print_json(&page);
    }

    if page.transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let pages = (page.total + page.page_size - 1) / page.page_size;

    println!();
    println!(
        "{:<12} {:<28} {:>10}  {:<20} {}",
        "Date", "Merchant", "Amount", "Category", ""
    );
    println!("{}", "─".repeat(76));

    for tx in &page.transactions {
        // Positive amounts are outflows; show them as negative like a statement
        let display = money(-tx.amount);
        println!(
            "{:<12} {:<28} {:>10}  {:<20} {}",
            tx.date,
            truncate(tx.merchant_label(), 28),
            display,
            truncate(tx.primary_category.as_deref().unwrap_or("-"), 20),
            if tx.pending { "pending" } else { "" }
        );
    }

    println!();
    println!(
        "Page {} of {} ({} transactions)",
        page.page,
        pages.max(1),
        page.total
    );
    Ok(())
}
