//! Domain models for Ledgerline
//!
//! Amount sign convention: positive = outflow (debit), negative = inflow (credit).
//! Every aggregate in `detect` and `dashboard` depends on it.

use std::ops::AddAssign;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Ledger rows
// =============================================================================

/// A stored connection to one institution through the aggregation provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: i64,
    pub user_id: String,
    /// Provider-side link (item) identifier
    pub external_id: String,
    /// Opaque credential handle, resolved by a `CredentialResolver`
    #[serde(skip_serializing)]
    pub access_credential: String,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    /// `None` means the link has never been synced (full backfill on next sync)
    pub cursor: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a link
#[derive(Debug, Clone)]
pub struct NewLink {
    pub user_id: String,
    pub external_id: String,
    pub access_credential: String,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
}

/// An account at a linked institution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub external_id: String,
    pub link_id: i64,
    pub user_id: String,
    pub name: String,
    pub mask: Option<String>,
    /// Provider account type, kept verbatim (open set)
    pub account_type: String,
    pub subtype: Option<String>,
    pub current_balance: f64,
    /// Absent for account types without an available balance
    pub available_balance: Option<f64>,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
}

impl Account {
    pub fn kind(&self) -> AccountKind {
        AccountKind::from_type(&self.account_type)
    }
}

/// Account types the aggregation logic distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Depository,
    Credit,
    Loan,
    Investment,
    Other,
}

impl AccountKind {
    /// Case-insensitive classification of a provider account type
    pub fn from_type(account_type: &str) -> Self {
        match account_type.trim().to_lowercase().as_str() {
            "depository" => Self::Depository,
            "credit" => Self::Credit,
            "loan" => Self::Loan,
            "investment" => Self::Investment,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Depository => "depository",
            Self::Credit => "credit",
            Self::Loan => "loan",
            Self::Investment => "investment",
            Self::Other => "other",
        }
    }

    /// Credit and loan balances are owed, never held
    pub fn is_liability(&self) -> bool {
        matches!(self, Self::Credit | Self::Loan)
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub external_id: String,
    pub account_id: i64,
    pub link_id: i64,
    pub user_id: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub pending: bool,
    pub pending_transaction_id: Option<String>,
    pub payment_channel: Option<String>,
    pub name: String,
    pub merchant_name: Option<String>,
    pub primary_category: Option<String>,
    pub detailed_category: Option<String>,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
    /// Provider payload as received, kept for audit/debugging
    #[serde(skip_serializing)]
    pub raw_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Merchant name, falling back to the transaction name
    pub fn merchant_label(&self) -> &str {
        self.merchant_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_outflow(&self) -> bool {
        self.amount > 0.0
    }
}

// =============================================================================
// Provider snapshots
// =============================================================================

/// Account as reported by the provider's accounts snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub name: String,
    pub mask: Option<String>,
    pub account_type: String,
    pub subtype: Option<String>,
    /// Stored as 0 when the provider omits it
    pub current_balance: Option<f64>,
    pub available_balance: Option<f64>,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
}

/// Transaction as delivered in a delta page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub authorized_date: Option<NaiveDate>,
    pub pending: bool,
    pub pending_transaction_id: Option<String>,
    pub payment_channel: Option<String>,
    pub name: String,
    pub merchant_name: Option<String>,
    pub primary_category: Option<String>,
    pub detailed_category: Option<String>,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
    /// Full provider payload
    pub raw: serde_json::Value,
}

/// One page of the provider's transaction delta feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaPage {
    pub added: Vec<TransactionSnapshot>,
    pub modified: Vec<TransactionSnapshot>,
    /// External ids of removed transactions
    pub removed: Vec<String>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// Institution details for a link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkMetadata {
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
}

// =============================================================================
// Sync results
// =============================================================================

/// Counts of delta entries applied during a sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub added: u64,
    pub modified: u64,
    pub removed: u64,
}

impl SyncStats {
    pub fn total(&self) -> u64 {
        self.added + self.modified + self.removed
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.modified += rhs.modified;
        self.removed += rhs.removed;
    }
}

/// One failed link in a batch sync
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSyncFailure {
    pub link_id: i64,
    pub kind: String,
    pub message: String,
    pub retryable: bool,
    /// What was committed before the failure
    pub stats: SyncStats,
}

/// Result of syncing every link of a user
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncReport {
    pub synced_links: usize,
    pub failed_links: Vec<LinkSyncFailure>,
    /// Sum over all links, including partial progress of failed ones
    pub totals: SyncStats,
}

impl BatchSyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed_links.is_empty()
    }
}

// =============================================================================
// Recurring charges
// =============================================================================

/// Repeat interval class of a recurring charge group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Biweekly,
    Monthly,
}

impl Cadence {
    /// Candidates in match priority order
    pub const ALL: [Cadence; 3] = [Cadence::Weekly, Cadence::Biweekly, Cadence::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn interval_days(&self) -> i64 {
        match self {
            Self::Weekly => 7,
            Self::Biweekly => 14,
            Self::Monthly => 30,
        }
    }

    /// Accepted distance of the mean gap from `interval_days`, inclusive
    pub fn tolerance_days(&self) -> f64 {
        match self {
            Self::Weekly => 2.0,
            Self::Biweekly => 3.0,
            Self::Monthly => 6.0,
        }
    }

    /// Average occurrences per month
    pub fn monthly_multiplier(&self) -> f64 {
        match self {
            Self::Weekly => 4.33,
            Self::Biweekly => 2.17,
            Self::Monthly => 1.0,
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recurring charge inferred from transaction history. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedSubscription {
    pub merchant_key: String,
    pub merchant: String,
    pub cadence: Cadence,
    pub average_amount: f64,
    pub estimated_monthly_cost: f64,
    pub last_charge_date: NaiveDate,
    pub next_expected_charge_date: NaiveDate,
    pub confidence: f64,
    pub charge_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTotals {
    pub estimated_monthly_cost: f64,
    pub estimated_yearly_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationSimulation {
    pub merchants: Vec<String>,
    pub monthly_savings: f64,
    pub yearly_savings: f64,
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTotals {
    pub assets: f64,
    pub liabilities: f64,
    pub net_worth: f64,
    pub cash: f64,
    pub investments: f64,
    pub debt: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlow {
    pub month_income: f64,
    pub month_spend: f64,
    pub month_net: f64,
    pub previous_month_spend: f64,
    /// `None` when last month had no outflow
    pub spend_change_pct: Option<f64>,
    pub avg_daily_outflow: f64,
    pub projected_30d_outflow: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub detected_count: usize,
    pub estimated_monthly_total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditUtilization {
    /// `None` when no credit account reports a limit ("unavailable", not zero)
    pub utilization_pct: Option<f64>,
    pub revolving_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category: String,
    pub amount: f64,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub totals: AccountTotals,
    pub cash_flow: CashFlow,
    pub subscriptions: SubscriptionSummary,
    pub credit: CreditUtilization,
    pub top_spending_categories: Vec<CategoryBreakdown>,
    pub accounts_count: usize,
}
