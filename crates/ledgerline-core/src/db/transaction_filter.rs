//! Transaction filter builder for constructing dynamic SQL queries
//!
//! Shared by `list_transactions` and `count_transactions` so both always agree
//! on which rows match.

use chrono::NaiveDate;

/// Builder for constructing transaction query filters
///
/// The lifetime `'query` is how long borrowed filter values (user id,
/// category) must remain valid.
#[derive(Default, Clone)]
pub struct TransactionFilter<'query> {
    pub user_id: Option<&'query str>,
    pub account_id: Option<i64>,
    pub link_id: Option<i64>,
    pub category: Option<&'query str>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    /// `Some(false)` keeps only posted transactions
    pub pending: Option<bool>,
    pub outflows_only: bool,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: &'static str,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> TransactionFilter<'query> {
    /// Create a new filter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one user's ledger
    pub fn user_id(mut self, user_id: &'query str) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn account_id(mut self, id: Option<i64>) -> Self {
        self.account_id = id;
        self
    }

    pub fn link_id(mut self, id: Option<i64>) -> Self {
        self.link_id = id;
        self
    }

    /// Primary category, compared case-insensitively
    pub fn category(mut self, category: Option<&'query str>) -> Self {
        self.category = category;
        self
    }

    /// Inclusive lower date bound
    pub fn since(mut self, date: Option<NaiveDate>) -> Self {
        self.since = date;
        self
    }

    /// Inclusive upper date bound
    pub fn until(mut self, date: Option<NaiveDate>) -> Self {
        self.until = date;
        self
    }

    pub fn pending(mut self, pending: Option<bool>) -> Self {
        self.pending = pending;
        self
    }

    /// Only positive amounts (money leaving the account)
    pub fn outflows_only(mut self, value: bool) -> Self {
        self.outflows_only = value;
        self
    }

    /// Build the filter components
    pub fn build(self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(user_id) = self.user_id {
            conditions.push("t.user_id = ?");
            params.push(Box::new(user_id.to_string()));
        }

        if let Some(aid) = self.account_id {
            conditions.push("t.account_id = ?");
            params.push(Box::new(aid));
        }

        if let Some(lid) = self.link_id {
            conditions.push("t.link_id = ?");
            params.push(Box::new(lid));
        }

        if let Some(category) = self.category {
            if !category.trim().is_empty() {
                conditions.push("t.primary_category = ? COLLATE NOCASE");
                params.push(Box::new(category.trim().to_string()));
            }
        }

        // Dates are stored as YYYY-MM-DD so string comparison is chronological
        if let Some(from) = self.since {
            conditions.push("t.date >= ?");
            params.push(Box::new(from.to_string()));
        }

        if let Some(to) = self.until {
            conditions.push("t.date <= ?");
            params.push(Box::new(to.to_string()));
        }

        if let Some(pending) = self.pending {
            conditions.push("t.pending = ?");
            params.push(Box::new(pending));
        }

        if self.outflows_only {
            conditions.push("t.amount > 0");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        FilterResult {
            where_clause,
            // Newest first; creation order breaks same-day ties
            order_clause: "ORDER BY t.date DESC, t.created_at DESC, t.id DESC",
            params,
        }
    }
}

impl FilterResult {
    /// Build a COUNT query
    pub fn build_count_query(&self) -> String {
        format!("SELECT COUNT(*) FROM transactions t {}", self.where_clause)
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        let result = TransactionFilter::new().build();
        assert!(result.where_clause.is_empty());
        assert!(result.params.is_empty());
        assert_eq!(
            result.build_count_query().trim(),
            "SELECT COUNT(*) FROM transactions t"
        );
    }

    #[test]
    fn test_combined_conditions() {
        let result = TransactionFilter::new()
            .user_id("u1")
            .account_id(Some(3))
            .category(Some("FOOD_AND_DRINK"))
            .since(NaiveDate::from_ymd_opt(2024, 1, 1))
            .until(NaiveDate::from_ymd_opt(2024, 1, 31))
            .pending(Some(false))
            .outflows_only(true)
            .build();

        assert!(result.where_clause.starts_with("WHERE t.user_id = ?"));
        assert!(result.where_clause.contains("t.primary_category = ? COLLATE NOCASE"));
        assert!(result.where_clause.contains("t.amount > 0"));
        assert_eq!(result.params.len(), 6);
    }

    #[test]
    fn test_blank_category_is_ignored() {
        let result = TransactionFilter::new().category(Some("  ")).build();
        assert!(result.where_clause.is_empty());
    }
}
