//! Rule-based insight cards
//!
//! Each rule looks at the dashboard summary, the detected subscriptions or
//! this month's transactions and emits at most one templated card.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::dashboard::{build_summary, current_month, DashboardEngine};
use crate::db::Database;
use crate::detect::DetectionConfig;
use crate::error::Result;
use crate::math::round_currency;
use crate::models::{DashboardSummary, DetectedSubscription, Transaction};

/// Maximum number of cards returned
pub const MAX_INSIGHTS: usize = 6;

const SPEND_TREND_THRESHOLD_PCT: f64 = 12.0;
const SUBSCRIPTION_COST_THRESHOLD: f64 = 100.0;
const UTILIZATION_THRESHOLD_PCT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Info,
    Success,
    Warning,
}

/// A single insight shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightCard {
    pub id: String,
    pub severity: InsightSeverity,
    pub title: String,
    pub message: String,
    pub confidence: f64,
    /// Summary fields the card was derived from
    pub data_references: Vec<String>,
}

impl InsightCard {
    fn new(
        id: &str,
        severity: InsightSeverity,
        title: &str,
        message: String,
        confidence: f64,
        data_references: &[&str],
    ) -> Self {
        Self {
            id: id.to_string(),
            severity,
            title: title.to_string(),
            message,
            confidence,
            data_references: data_references.iter().map(|r| r.to_string()).collect(),
        }
    }
}

pub struct InsightEngine<'a> {
    dashboard: DashboardEngine<'a>,
}

impl<'a> InsightEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            dashboard: DashboardEngine::new(db),
        }
    }

    pub fn with_detection_config(db: &'a Database, detection: DetectionConfig) -> Self {
        Self {
            dashboard: DashboardEngine::with_detection_config(db, detection),
        }
    }

    pub fn insights_for_user(&self, user_id: &str) -> Result<Vec<InsightCard>> {
        self.insights_for_user_as_of(user_id, Utc::now().date_naive())
    }

    pub fn insights_for_user_as_of(&self, user_id: &str, today: NaiveDate) -> Result<Vec<InsightCard>> {
        let inputs = self.dashboard.load_inputs_as_of(user_id, today)?;
        let summary = build_summary(&inputs, today);
        let this_month = current_month(&inputs.transactions, today);
        Ok(generate_insights(&summary, &inputs.subscriptions, &this_month))
    }
}

/// Apply every rule in order and keep the first `MAX_INSIGHTS` cards
pub fn generate_insights(
    summary: &DashboardSummary,
    subscriptions: &[DetectedSubscription],
    current_month: &[&Transaction],
) -> Vec<InsightCard> {
    let mut cards = Vec::new();
    let flow = &summary.cash_flow;

    if let Some(change) = flow.spend_change_pct.filter(|pct| *pct > SPEND_TREND_THRESHOLD_PCT) {
        cards.push(InsightCard::new(
            "spend-trend-up",
            InsightSeverity::Warning,
            "Spending increased month-over-month",
            format!(
                "Your spend is up {}% vs last month. Reviewing discretionary categories now can prevent end-of-month cash pressure.",
                change
            ),
            0.9,
            &["cashFlow.monthSpend", "cashFlow.previousMonthSpend"],
        ));
    }

    let monthly_total = summary.subscriptions.estimated_monthly_total;
    if monthly_total > SUBSCRIPTION_COST_THRESHOLD {
        cards.push(InsightCard::new(
            "subscription-overview",
            InsightSeverity::Info,
            "High recurring subscription cost detected",
            format!(
                "Detected recurring charges total about ${:.2}/month. Pruning low-value subscriptions could save roughly ${:.2}/year.",
                monthly_total,
                round_currency(monthly_total * 12.0)
            ),
            0.82,
            &["subscriptions.detectedCount", "subscriptions.estimatedMonthlyTotal"],
        ));
    }

    if let Some(utilization) = summary
        .credit
        .utilization_pct
        .filter(|pct| *pct > UTILIZATION_THRESHOLD_PCT)
    {
        cards.push(InsightCard::new(
            "credit-utilization",
            InsightSeverity::Warning,
            "Credit utilization above ideal threshold",
            format!(
                "Current utilization is {}%. Moving below 30% can improve credit profile and reduce interest drag.",
                utilization
            ),
            0.88,
            &["credit.utilizationPct", "credit.revolvingBalance"],
        ));
    }

    if let Some((merchant, amount)) = top_merchant(current_month) {
        cards.push(InsightCard::new(
            "top-merchant-spend",
            InsightSeverity::Info,
            "Top spend merchant this month",
            format!(
                "{} is currently your largest spending merchant at ${:.2} this month.",
                merchant,
                round_currency(amount)
            ),
            0.78,
            &["transactions.currentMonth"],
        ));
    }

    if flow.month_net > 0.0 {
        cards.push(InsightCard::new(
            "positive-cashflow",
            InsightSeverity::Success,
            "Positive cash flow this month",
            format!(
                "You are currently net positive by ${:.2}. Routing a portion to high-yield savings can improve returns without adding risk.",
                flow.month_net
            ),
            0.85,
            &["cashFlow.monthIncome", "cashFlow.monthSpend"],
        ));
    }

    // Subscriptions arrive sorted by monthly cost
    if let Some(highest) = subscriptions.first() {
        cards.push(InsightCard::new(
            "highest-subscription",
            InsightSeverity::Info,
            "Largest recurring payment",
            format!(
                "{} is your highest recurring charge at about ${:.2}/month.",
                highest.merchant, highest.estimated_monthly_cost
            ),
            highest.confidence,
            &["subscriptions.merchant", "subscriptions.estimatedMonthlyCost"],
        ));
    }

    cards.truncate(MAX_INSIGHTS);
    cards
}

/// Merchant with the largest outflow, ties broken alphabetically
fn top_merchant(transactions: &[&Transaction]) -> Option<(String, f64)> {
    let mut spend: BTreeMap<&str, f64> = BTreeMap::new();
    for t in transactions.iter().filter(|t| t.is_outflow()) {
        *spend.entry(t.merchant_label()).or_insert(0.0) += t.amount;
    }

    spend
        .into_iter()
        .fold(None, |best: Option<(&str, f64)>, (merchant, amount)| match best {
            Some((_, top)) if top >= amount => best,
            _ => Some((merchant, amount)),
        })
        .map(|(merchant, amount)| (merchant.to_string(), amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AccountTotals, Cadence, CashFlow, CreditUtilization, SubscriptionSummary,
    };
    use crate::test_utils::ledger_transaction;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn quiet_summary() -> DashboardSummary {
        DashboardSummary {
            totals: AccountTotals::default(),
            cash_flow: CashFlow::default(),
            subscriptions: SubscriptionSummary::default(),
            credit: CreditUtilization::default(),
            top_spending_categories: Vec::new(),
            accounts_count: 0,
        }
    }

    fn subscription(merchant: &str, monthly: f64) -> DetectedSubscription {
        DetectedSubscription {
            merchant_key: merchant.to_lowercase(),
            merchant: merchant.to_string(),
            cadence: Cadence::Monthly,
            average_amount: monthly,
            estimated_monthly_cost: monthly,
            last_charge_date: day(1),
            next_expected_charge_date: day(31),
            confidence: 0.97,
            charge_count: 4,
        }
    }

    fn ids(cards: &[InsightCard]) -> Vec<&str> {
        cards.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_no_data_no_cards() {
        assert!(generate_insights(&quiet_summary(), &[], &[]).is_empty());
    }

    #[test]
    fn test_all_rules_fire_in_order() {
        let mut summary = quiet_summary();
        summary.cash_flow.spend_change_pct = Some(25.5);
        summary.cash_flow.month_net = 420.0;
        summary.subscriptions.estimated_monthly_total = 150.0;
        summary.credit.utilization_pct = Some(45.0);

        let subs = vec![subscription("Gym", 90.0), subscription("Netflix", 15.99)];
        let grocery = ledger_transaction("g", "Grocer", 80.0, day(3));
        let cafe = ledger_transaction("c", "Cafe", 12.5, day(4));
        let cafe2 = ledger_transaction("c2", "Cafe", 70.0, day(6));

        let cards = generate_insights(&summary, &subs, &[&grocery, &cafe, &cafe2]);
        assert_eq!(
            ids(&cards),
            vec![
                "spend-trend-up",
                "subscription-overview",
                "credit-utilization",
                "top-merchant-spend",
                "positive-cashflow",
                "highest-subscription",
            ]
        );
        assert!(cards[0].message.contains("25.5%"));
        assert!(cards[1].message.contains("$1800.00/year"));
        assert!(cards[3].message.starts_with("Cafe"));
        assert!(cards[3].message.contains("$82.50"));
        assert_eq!(cards[5].confidence, 0.97);
        assert_eq!(cards[5].severity, InsightSeverity::Info);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let mut summary = quiet_summary();
        summary.cash_flow.spend_change_pct = Some(12.0);
        summary.subscriptions.estimated_monthly_total = 100.0;
        summary.credit.utilization_pct = Some(30.0);
        summary.cash_flow.month_net = 0.0;

        assert!(generate_insights(&summary, &[], &[]).is_empty());
    }

    #[test]
    fn test_top_merchant_ignores_inflows() {
        let refund = ledger_transaction("r", "Employer", -3000.0, day(2));
        let coffee = ledger_transaction("k", "Coffee", 4.0, day(2));
        assert_eq!(top_merchant(&[&refund, &coffee]), Some(("Coffee".to_string(), 4.0)));
        assert_eq!(top_merchant(&[&refund]), None);

        // Ties go to the alphabetically first merchant
        let a = ledger_transaction("a", "Apple", 10.0, day(2));
        let b = ledger_transaction("b", "Banana", 10.0, day(2));
        assert_eq!(top_merchant(&[&b, &a]).unwrap().0, "Apple");
    }

    #[test]
    fn test_serializes_for_clients() {
        let cards = generate_insights(&quiet_summary(), &[subscription("Gym", 30.0)], &[]);
        let json = serde_json::to_value(&cards[0]).unwrap();
        assert_eq!(json["severity"], "info");
        assert_eq!(json["dataReferences"][0], "subscriptions.merchant");
    }
}
