//! Recurring-charge detection
//!
//! Groups a user's recent outflows by normalized merchant key and classifies
//! each group as weekly, biweekly or monthly from the mean gap between
//! charges. Groups with irregular gaps or volatile amounts are discarded.
//! Results are derived on demand and never persisted.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::db::{Database, TransactionFilter};
use crate::error::Result;
use crate::math::{clamp, mean, round_currency, round_to, std_dev, sum};
use crate::models::{
    CancellationSimulation, Cadence, DetectedSubscription, SubscriptionTotals, Transaction,
};

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Weight of amount volatility in the confidence score
const AMOUNT_WEIGHT: f64 = 0.55;
/// Weight of interval volatility in the confidence score
const INTERVAL_WEIGHT: f64 = 0.45;

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Only transactions dated on or after `today - lookback_days` are considered
    pub lookback_days: i64,
    /// Minimum charges in a group
    pub min_charges: usize,
    /// Maximum stdev/mean of a group's amounts
    pub max_amount_volatility: f64,
    /// Candidate cadences, tried in order; the first whose band contains the mean gap wins
    pub cadences: Vec<Cadence>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            lookback_days: 180,
            min_charges: 2,
            max_amount_volatility: 0.35,
            cadences: Cadence::ALL.to_vec(),
        }
    }
}

/// Detects recurring charges in a user's ledger
pub struct SubscriptionDetector<'a> {
    db: &'a Database,
    config: DetectionConfig,
}

impl<'a> SubscriptionDetector<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            config: DetectionConfig::default(),
        }
    }

    pub fn with_config(db: &'a Database, config: DetectionConfig) -> Self {
        Self { db, config }
    }

    /// Detected subscriptions, most expensive first
    pub fn detect_subscriptions(&self, user_id: &str) -> Result<Vec<DetectedSubscription>> {
        self.detect_subscriptions_as_of(user_id, Utc::now().date_naive())
    }

    /// Same as `detect_subscriptions` with a fixed "today"
    pub fn detect_subscriptions_as_of(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<DetectedSubscription>> {
        let since = today - Duration::days(self.config.lookback_days);
        let filter = TransactionFilter::new()
            .user_id(user_id)
            .since(Some(since))
            .until(Some(today))
            .pending(Some(false))
            .outflows_only(true);
        let transactions = self.db.list_transactions(filter, None, 0)?;

        let detected = detect_recurring(&transactions, today, &self.config);
        info!(
            user_id,
            candidates = transactions.len(),
            detected = detected.len(),
            "Subscription detection complete"
        );
        Ok(detected)
    }

    pub fn simulate_cancellation<S: AsRef<str>>(
        &self,
        user_id: &str,
        merchants: &[S],
    ) -> Result<CancellationSimulation> {
        self.simulate_cancellation_as_of(user_id, merchants, Utc::now().date_naive())
    }

    /// Savings from cancelling the subscriptions matching `merchants`
    ///
    /// Labels are compared by merchant key, so case and punctuation do not
    /// matter. Labels matching nothing are dropped.
    pub fn simulate_cancellation_as_of<S: AsRef<str>>(
        &self,
        user_id: &str,
        merchants: &[S],
        today: NaiveDate,
    ) -> Result<CancellationSimulation> {
        let subscriptions = self.detect_subscriptions_as_of(user_id, today)?;
        Ok(simulate_cancellation(&subscriptions, merchants))
    }
}

/// Grouping key for a merchant label
///
/// Lower-cases, replaces every run of characters outside `[a-z0-9]` with one
/// space and trims. "Netflix.com", "NETFLIX COM" and " netflix--com " share a key.
pub fn normalize_merchant_key(label: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&label.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// First cadence whose band contains `mean_gap` (bounds inclusive)
pub fn match_cadence(mean_gap: f64, candidates: &[Cadence]) -> Option<Cadence> {
    candidates
        .iter()
        .copied()
        .find(|c| (mean_gap - c.interval_days() as f64).abs() <= c.tolerance_days())
}

/// Classify recurring charges among `transactions`
///
/// Only settled outflows dated within the lookback window ending at `today`
/// are considered. Output is sorted by monthly cost descending, then merchant key.
pub fn detect_recurring(
    transactions: &[Transaction],
    today: NaiveDate,
    config: &DetectionConfig,
) -> Vec<DetectedSubscription> {
    let since = today - Duration::days(config.lookback_days);

    let mut charges: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| !t.pending && t.is_outflow() && t.date >= since && t.date <= today)
        .collect();
    charges.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.external_id.cmp(&b.external_id)));

    // key -> (first-seen label, charges in date order)
    let mut groups: BTreeMap<String, (String, Vec<&Transaction>)> = BTreeMap::new();
    for charge in charges {
        let label = charge.merchant_label().trim();
        if label.is_empty() {
            continue;
        }
        let key = normalize_merchant_key(label);
        if key.is_empty() {
            continue;
        }
        groups
            .entry(key)
            .or_insert_with(|| (label.to_string(), Vec::new()))
            .1
            .push(charge);
    }

    let mut detected: Vec<DetectedSubscription> = groups
        .into_iter()
        .filter_map(|(key, (label, group))| classify_group(key, label, &group, config))
        .collect();

    detected.sort_by(|a, b| {
        b.estimated_monthly_cost
            .total_cmp(&a.estimated_monthly_cost)
            .then_with(|| a.merchant_key.cmp(&b.merchant_key))
    });
    detected
}

fn classify_group(
    key: String,
    label: String,
    group: &[&Transaction],
    config: &DetectionConfig,
) -> Option<DetectedSubscription> {
    if group.len() < config.min_charges.max(2) {
        return None;
    }

    let gaps: Vec<f64> = group
        .windows(2)
        .map(|w| (w[1].date - w[0].date).num_days() as f64)
        .collect();
    let mean_gap = mean(&gaps);

    let Some(cadence) = match_cadence(mean_gap, &config.cadences) else {
        debug!(merchant = %key, mean_gap, "Discarded group: no matching cadence");
        return None;
    };

    let amounts: Vec<f64> = group.iter().map(|t| t.amount).collect();
    let amount_mean = mean(&amounts);
    if amount_mean <= 0.0 {
        return None;
    }
    let amount_volatility = std_dev(&amounts) / amount_mean;
    if amount_volatility > config.max_amount_volatility {
        debug!(merchant = %key, amount_volatility, "Discarded group: amounts too volatile");
        return None;
    }

    let interval_volatility = std_dev(&gaps) / cadence.interval_days() as f64;
    let confidence = clamp(
        1.0 - AMOUNT_WEIGHT * amount_volatility - INTERVAL_WEIGHT * interval_volatility,
        0.0,
        1.0,
    );

    let average_amount = round_currency(amount_mean);
    let last_charge_date = group.last()?.date;

    Some(DetectedSubscription {
        merchant_key: key,
        merchant: label,
        cadence,
        average_amount,
        estimated_monthly_cost: round_currency(average_amount * cadence.monthly_multiplier()),
        last_charge_date,
        next_expected_charge_date: last_charge_date + Duration::days(cadence.interval_days()),
        confidence: round_to(confidence, 3),
        charge_count: group.len(),
    })
}

/// Monthly and yearly cost of all detected subscriptions
pub fn subscription_totals(subscriptions: &[DetectedSubscription]) -> SubscriptionTotals {
    let costs: Vec<f64> = subscriptions
        .iter()
        .map(|s| s.estimated_monthly_cost)
        .collect();
    let monthly = round_currency(sum(&costs));

    SubscriptionTotals {
        estimated_monthly_cost: monthly,
        estimated_yearly_cost: round_currency(monthly * 12.0),
    }
}

/// Savings from cancelling the subscriptions whose key matches one of `merchants`
pub fn simulate_cancellation<S: AsRef<str>>(
    subscriptions: &[DetectedSubscription],
    merchants: &[S],
) -> CancellationSimulation {
    let wanted: HashSet<String> = merchants
        .iter()
        .map(|m| normalize_merchant_key(m.as_ref()))
        .collect();

    let matched: Vec<&DetectedSubscription> = subscriptions
        .iter()
        .filter(|s| wanted.contains(&s.merchant_key))
        .collect();

    let costs: Vec<f64> = matched.iter().map(|s| s.estimated_monthly_cost).collect();
    let monthly_savings = round_currency(sum(&costs));

    CancellationSimulation {
        merchants: matched.iter().map(|s| s.merchant.clone()).collect(),
        monthly_savings,
        yearly_savings: round_currency(monthly_savings * 12.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeltaPage, NewLink};
    use crate::test_utils::{ledger_transaction, transaction_snapshot};
    use std::collections::HashMap;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        day(2024, 7, 1)
    }

    /// Charges for `merchant` at the given day offsets from `start`
    fn series(merchant: &str, start: NaiveDate, offsets: &[i64], amounts: &[f64]) -> Vec<Transaction> {
        offsets
            .iter()
            .zip(amounts)
            .enumerate()
            .map(|(i, (offset, amount))| {
                ledger_transaction(
                    &format!("{}-{}", merchant, i),
                    merchant,
                    *amount,
                    start + Duration::days(*offset),
                )
            })
            .collect()
    }

    fn detect(transactions: &[Transaction]) -> Vec<DetectedSubscription> {
        detect_recurring(transactions, today(), &DetectionConfig::default())
    }

    #[test]
    fn test_normalize_merchant_key() {
        assert_eq!(normalize_merchant_key("Netflix.com"), "netflix com");
        assert_eq!(normalize_merchant_key("  NETFLIX   COM "), "netflix com");
        assert_eq!(normalize_merchant_key("Spotify*USA #12"), "spotify usa 12");
        assert_eq!(normalize_merchant_key("---"), "");
    }

    #[test]
    fn test_cadence_bands() {
        let all = Cadence::ALL;
        assert_eq!(match_cadence(9.0, &all), Some(Cadence::Weekly));
        assert_eq!(match_cadence(9.5, &all), None);
        assert_eq!(match_cadence(11.0, &all), Some(Cadence::Biweekly));
        assert_eq!(match_cadence(17.0, &all), Some(Cadence::Biweekly));
        assert_eq!(match_cadence(17.5, &all), None);
        assert_eq!(match_cadence(24.0, &all), Some(Cadence::Monthly));
        assert_eq!(match_cadence(36.0, &all), Some(Cadence::Monthly));
        assert_eq!(match_cadence(36.5, &all), None);
        assert_eq!(match_cadence(5.0, &all), Some(Cadence::Weekly));
        assert_eq!(match_cadence(4.5, &all), None);
    }

    #[test]
    fn test_monthly_subscription() {
        let charges = series(
            "Netflix",
            day(2024, 1, 15),
            &[0, 30, 60, 90, 120, 150],
            &[15.99; 6],
        );

        let detected = detect(&charges);
        assert_eq!(detected.len(), 1);

        let sub = &detected[0];
        assert_eq!(sub.cadence, Cadence::Monthly);
        assert_eq!(sub.merchant, "Netflix");
        assert_eq!(sub.merchant_key, "netflix");
        assert_eq!(sub.average_amount, 15.99);
        assert_eq!(sub.estimated_monthly_cost, 15.99);
        assert!(sub.confidence > 0.95);
        assert_eq!(sub.charge_count, 6);
        assert_eq!(sub.last_charge_date, day(2024, 6, 13));
        assert_eq!(sub.next_expected_charge_date, day(2024, 7, 13));
    }

    #[test]
    fn test_weekly_and_biweekly_costs() {
        let mut charges = series("Gym", day(2024, 5, 1), &[0, 7, 14, 21], &[10.0; 4]);
        charges.extend(series("Cleaner", day(2024, 4, 1), &[0, 14, 28], &[50.0; 3]));

        let detected = detect(&charges);
        assert_eq!(detected.len(), 2);

        // 50 * 2.17 = 108.5 ahead of 10 * 4.33 = 43.3
        assert_eq!(detected[0].merchant, "Cleaner");
        assert_eq!(detected[0].cadence, Cadence::Biweekly);
        assert_eq!(detected[0].estimated_monthly_cost, 108.5);
        assert_eq!(detected[1].cadence, Cadence::Weekly);
        assert_eq!(detected[1].estimated_monthly_cost, 43.3);
    }

    #[test]
    fn test_irregular_gaps_are_discarded() {
        // Gaps 5, 40, 9, 31: mean 21.25 fits no band
        let charges = series("Coffee", day(2024, 2, 1), &[0, 5, 45, 54, 85], &[4.5; 5]);
        assert!(detect(&charges).is_empty());
    }

    #[test]
    fn test_volatile_amounts_are_discarded() {
        let charges = series(
            "Utility",
            day(2024, 3, 1),
            &[0, 30, 60, 90],
            &[20.0, 20.0, 20.0, 60.0],
        );
        assert!(detect(&charges).is_empty());
    }

    #[test]
    fn test_band_edge_through_detection() {
        // Gaps 8 and 10: mean 9 is still weekly
        let charges = series("Box", day(2024, 6, 1), &[0, 8, 18], &[30.0; 3]);
        let detected = detect(&charges);
        assert_eq!(detected[0].cadence, Cadence::Weekly);
        // stdev of gaps is 1 -> interval volatility 1/7
        assert_eq!(detected[0].confidence, round_to(1.0 - 0.45 / 7.0, 3));
    }

    #[test]
    fn test_scope_excludes_pending_inflows_and_old_charges() {
        let mut charges = series("Music", day(2024, 4, 1), &[0, 30, 60], &[9.99; 3]);
        // Outside the 180 day window
        charges.push(ledger_transaction("old", "Music", 9.99, day(2023, 12, 1)));
        let mut pending = ledger_transaction("pending", "Music", 9.99, day(2024, 6, 28));
        pending.pending = true;
        charges.push(pending);
        charges.extend(series("Refund", day(2024, 4, 1), &[0, 30, 60], &[-9.99; 3]));

        let detected = detect(&charges);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].charge_count, 3);
        assert_eq!(detected[0].last_charge_date, day(2024, 5, 31));
    }

    #[test]
    fn test_single_charge_and_blank_labels() {
        let mut blank = series("Ghost", day(2024, 4, 1), &[0, 30, 60], &[5.0; 3]);
        for t in &mut blank {
            t.merchant_name = None;
            t.name = "   ".to_string();
        }
        let mut charges = blank;
        charges.push(ledger_transaction("once", "One-off", 99.0, day(2024, 6, 1)));

        assert!(detect(&charges).is_empty());
    }

    #[test]
    fn test_variants_share_a_group_with_first_label() {
        let mut charges = series("Hulu.com", day(2024, 3, 5), &[0], &[7.99]);
        charges.extend(series("HULU COM", day(2024, 4, 4), &[0, 30], &[7.99; 2]));

        let detected = detect(&charges);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].merchant, "Hulu.com");
        assert_eq!(detected[0].charge_count, 3);
    }

    #[test]
    fn test_sort_ties_by_key() {
        let mut charges = series("Zeta", day(2024, 4, 1), &[0, 30], &[10.0; 2]);
        charges.extend(series("Alpha", day(2024, 4, 1), &[0, 30], &[10.0; 2]));

        let detected = detect(&charges);
        let keys: Vec<&str> = detected.iter().map(|s| s.merchant_key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_totals_and_cancellation() {
        let mut charges = series("Netflix", day(2024, 3, 1), &[0, 30, 60], &[15.99; 3]);
        charges.extend(series("Spotify", day(2024, 3, 10), &[0, 30, 60], &[9.99; 3]));
        let detected = detect(&charges);

        let totals = subscription_totals(&detected);
        assert_eq!(totals.estimated_monthly_cost, 25.98);
        assert_eq!(totals.estimated_yearly_cost, 311.76);

        let sim = simulate_cancellation(&detected, &["  NETFLIX!!", "Unknown Service"]);
        assert_eq!(sim.merchants, vec!["Netflix".to_string()]);
        assert_eq!(sim.monthly_savings, detected[0].estimated_monthly_cost);
        assert_eq!(sim.yearly_savings, round_currency(detected[0].estimated_monthly_cost * 12.0));

        let none = simulate_cancellation::<&str>(&detected, &[]);
        assert_eq!(none, CancellationSimulation::default());
    }

    #[test]
    fn test_detector_reads_ledger() {
        let db = Database::in_memory().unwrap();
        let link = db
            .upsert_link(&NewLink {
                user_id: "user-1".to_string(),
                external_id: "item-1".to_string(),
                access_credential: "token".to_string(),
                institution_id: None,
                institution_name: None,
            })
            .unwrap();

        let added = (0..4)
            .map(|i| {
                transaction_snapshot(
                    &format!("tv-{}", i),
                    "acc-1",
                    "StreamCo",
                    12.0,
                    day(2024, 3, 3) + Duration::days(30 * i),
                )
            })
            .collect();
        let page = DeltaPage {
            added,
            next_cursor: "c1".to_string(),
            ..Default::default()
        };
        db.commit_delta_page(&link, &page, &mut HashMap::new())
            .unwrap();

        let detector = SubscriptionDetector::new(&db);
        let detected = detector
            .detect_subscriptions_as_of("user-1", today())
            .unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].merchant, "StreamCo");

        // Other users see nothing
        assert!(detector
            .detect_subscriptions_as_of("user-2", today())
            .unwrap()
            .is_empty());

        let sim = detector
            .simulate_cancellation_as_of("user-1", &["streamco"], today())
            .unwrap();
        assert_eq!(sim.monthly_savings, 12.0);
        assert_eq!(sim.yearly_savings, 144.0);
    }
}
