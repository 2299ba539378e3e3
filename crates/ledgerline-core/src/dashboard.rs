//! Dashboard aggregation
//!
//! Net worth, credit utilization, month-over-month cash flow, a linear burn
//! rate forecast and top spending categories, computed fresh from the ledger
//! on every call. Accumulation uses full precision; currency values are
//! rounded to cents only when placed in the output.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::dates::{end_of_previous_month, inclusive_span_days, start_of_month, start_of_previous_month};
use crate::db::{Database, TransactionFilter};
use crate::detect::{subscription_totals, DetectionConfig, SubscriptionDetector};
use crate::error::Result;
use crate::math::{round_currency, round_to};
use crate::models::{
    Account, AccountKind, AccountTotals, CashFlow, CategoryBreakdown, CreditUtilization,
    DashboardSummary, DetectedSubscription, SubscriptionSummary, Transaction,
};

/// Number of categories in `top_spending_categories`
pub const TOP_CATEGORY_LIMIT: usize = 5;
/// Bucket for transactions without a primary category
pub const UNCATEGORIZED: &str = "OTHER";

/// Everything a dashboard is computed from
#[derive(Debug, Clone)]
pub struct DashboardInputs {
    pub accounts: Vec<Account>,
    /// Settled transactions from the start of the previous month through today
    pub transactions: Vec<Transaction>,
    pub subscriptions: Vec<DetectedSubscription>,
}

/// Builds dashboard summaries from the ledger
pub struct DashboardEngine<'a> {
    db: &'a Database,
    detection: DetectionConfig,
}

impl<'a> DashboardEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            detection: DetectionConfig::default(),
        }
    }

    pub fn with_detection_config(db: &'a Database, detection: DetectionConfig) -> Self {
        Self { db, detection }
    }

    pub fn dashboard_summary(&self, user_id: &str) -> Result<DashboardSummary> {
        self.dashboard_summary_as_of(user_id, Utc::now().date_naive())
    }

    pub fn dashboard_summary_as_of(&self, user_id: &str, today: NaiveDate) -> Result<DashboardSummary> {
        let inputs = self.load_inputs_as_of(user_id, today)?;
        Ok(build_summary(&inputs, today))
    }

    /// Read accounts, the two-month transaction window and detected subscriptions
    pub fn load_inputs_as_of(&self, user_id: &str, today: NaiveDate) -> Result<DashboardInputs> {
        let accounts = self.db.list_accounts_for_user(user_id)?;

        let window = TransactionFilter::new()
            .user_id(user_id)
            .since(Some(start_of_previous_month(today)))
            .until(Some(today))
            .pending(Some(false));
        let transactions = self.db.list_transactions(window, None, 0)?;

        let subscriptions = SubscriptionDetector::with_config(self.db, self.detection.clone())
            .detect_subscriptions_as_of(user_id, today)?;

        debug!(
            user_id,
            accounts = accounts.len(),
            transactions = transactions.len(),
            subscriptions = subscriptions.len(),
            "Loaded dashboard inputs"
        );

        Ok(DashboardInputs {
            accounts,
            transactions,
            subscriptions,
        })
    }
}

/// Assemble a summary from already-loaded inputs
pub fn build_summary(inputs: &DashboardInputs, today: NaiveDate) -> DashboardSummary {
    let current = current_month(&inputs.transactions, today);
    let totals = subscription_totals(&inputs.subscriptions);

    DashboardSummary {
        totals: account_totals(&inputs.accounts),
        cash_flow: cash_flow(&inputs.transactions, today),
        subscriptions: SubscriptionSummary {
            detected_count: inputs.subscriptions.len(),
            estimated_monthly_total: totals.estimated_monthly_cost,
        },
        credit: credit_utilization(&inputs.accounts),
        top_spending_categories: top_spending_categories(&current, TOP_CATEGORY_LIMIT),
        accounts_count: inputs.accounts.len(),
    }
}

/// Settled transactions dated in the month containing `today`, up to `today`
pub fn current_month(transactions: &[Transaction], today: NaiveDate) -> Vec<&Transaction> {
    let start = start_of_month(today);
    transactions
        .iter()
        .filter(|t| !t.pending && t.date >= start && t.date <= today)
        .collect()
}

/// Assets, liabilities and net worth
///
/// Credit and loan balances only ever count as liabilities. For other
/// account types a negative balance is a liability.
pub fn account_totals(accounts: &[Account]) -> AccountTotals {
    let mut assets = 0.0;
    let mut liabilities = 0.0;
    let mut cash = 0.0;
    let mut investments = 0.0;

    for account in accounts {
        let balance = account.current_balance;
        let kind = account.kind();

        if kind.is_liability() {
            liabilities += balance.max(0.0);
            continue;
        }

        if balance >= 0.0 {
            assets += balance;
        } else {
            liabilities += balance.abs();
        }

        match kind {
            AccountKind::Depository => cash += balance.max(0.0),
            AccountKind::Investment => investments += balance.max(0.0),
            _ => {}
        }
    }

    AccountTotals {
        assets: round_currency(assets),
        liabilities: round_currency(liabilities),
        net_worth: round_currency(assets - liabilities),
        cash: round_currency(cash),
        investments: round_currency(investments),
        debt: round_currency(liabilities),
    }
}

/// Revolving balance over total limit of credit accounts
///
/// A card's limit is its balance plus its available credit; cards without an
/// available balance contribute to the balance but not the limit.
pub fn credit_utilization(accounts: &[Account]) -> CreditUtilization {
    let mut balance = 0.0;
    let mut limit = 0.0;

    for account in accounts.iter().filter(|a| a.kind() == AccountKind::Credit) {
        let owed = account.current_balance.max(0.0);
        balance += owed;
        if let Some(available) = account.available_balance {
            limit += owed + available;
        }
    }

    CreditUtilization {
        utilization_pct: (limit > 0.0).then(|| round_currency(balance / limit * 100.0)),
        revolving_balance: round_currency(balance),
    }
}

/// Current vs previous month cash flow, plus the burn rate forecast
pub fn cash_flow(transactions: &[Transaction], today: NaiveDate) -> CashFlow {
    let previous_start = start_of_previous_month(today);
    let previous_end = end_of_previous_month(today);

    let current = current_month(transactions, today);
    let month_spend: f64 = current.iter().filter(|t| t.amount > 0.0).map(|t| t.amount).sum();
    let month_income: f64 = current
        .iter()
        .filter(|t| t.amount < 0.0)
        .map(|t| t.amount.abs())
        .sum();

    let previous_month_spend: f64 = transactions
        .iter()
        .filter(|t| !t.pending && t.date >= previous_start && t.date <= previous_end)
        .filter(|t| t.amount > 0.0)
        .map(|t| t.amount)
        .sum();

    let spend_change_pct = (previous_month_spend > 0.0).then(|| {
        round_to(
            (month_spend - previous_month_spend) / previous_month_spend * 100.0,
            2,
        )
    });

    let (avg_daily_outflow, projected_30d_outflow) = forecast_burn_rate(&current);
    let income = round_currency(month_income);
    let spend = round_currency(month_spend);

    CashFlow {
        month_income: income,
        month_spend: spend,
        // Derived from the displayed figures so the three always reconcile
        month_net: round_currency(income - spend),
        previous_month_spend: round_currency(previous_month_spend),
        spend_change_pct,
        avg_daily_outflow: round_currency(avg_daily_outflow),
        projected_30d_outflow: round_currency(projected_30d_outflow),
    }
}

/// Average daily outflow over the observed span and its 30 day projection (unrounded)
///
/// The span runs from the earliest to the latest transaction date, inclusive.
pub fn forecast_burn_rate(transactions: &[&Transaction]) -> (f64, f64) {
    let first = transactions.iter().map(|t| t.date).min();
    let last = transactions.iter().map(|t| t.date).max();
    let (Some(first), Some(last)) = (first, last) else {
        return (0.0, 0.0);
    };

    let observed_days = inclusive_span_days(first, last) as f64;
    let outflow: f64 = transactions
        .iter()
        .filter(|t| t.amount > 0.0)
        .map(|t| t.amount)
        .sum();

    let avg = outflow / observed_days;
    (avg, avg * 30.0)
}

/// Outflow per primary category, largest first
pub fn top_spending_categories(transactions: &[&Transaction], limit: usize) -> Vec<CategoryBreakdown> {
    let mut by_category: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for t in transactions.iter().filter(|t| t.amount > 0.0) {
        let category = t.primary_category.as_deref().unwrap_or(UNCATEGORIZED);
        let entry = by_category.entry(category).or_insert((0.0, 0));
        entry.0 += t.amount;
        entry.1 += 1;
    }

    let mut ranked: Vec<(&str, f64, usize)> = by_category
        .into_iter()
        .map(|(category, (amount, count))| (category, amount, count))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(category, amount, transaction_count)| CategoryBreakdown {
            category: category.to_string(),
            amount: round_currency(amount),
            transaction_count,
        })
        .collect()
}
