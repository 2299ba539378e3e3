//! Transaction operations

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use super::accounts::ensure_placeholder;
use super::{parse_date, parse_datetime, Database, TransactionFilter};
use crate::error::{Error, Result};
use crate::models::{DeltaPage, Link, SyncStats, Transaction, TransactionSnapshot};

const TRANSACTION_COLUMNS: &str = "t.id, t.external_id, t.account_id, t.link_id, t.user_id, \
     t.amount, t.date, t.authorized_date, t.pending, t.pending_transaction_id, t.payment_channel, \
     t.name, t.merchant_name, t.primary_category, t.detailed_category, t.iso_currency_code, \
     t.unofficial_currency_code, t.raw_json, t.created_at";

fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    let date: String = row.get(6)?;
    let authorized_date: Option<String> = row.get(7)?;
    let created_at: String = row.get(18)?;

    Ok(Transaction {
        id: row.get(0)?,
        external_id: row.get(1)?,
        account_id: row.get(2)?,
        link_id: row.get(3)?,
        user_id: row.get(4)?,
        amount: row.get(5)?,
        date: parse_date(&date)?,
        authorized_date: authorized_date.as_deref().map(parse_date).transpose()?,
        pending: row.get(8)?,
        pending_transaction_id: row.get(9)?,
        payment_channel: row.get(10)?,
        name: row.get(11)?,
        merchant_name: row.get(12)?,
        primary_category: row.get(13)?,
        detailed_category: row.get(14)?,
        iso_currency_code: row.get(15)?,
        unofficial_currency_code: row.get(16)?,
        raw_json: row.get(17)?,
        created_at: parse_datetime(&created_at),
    })
}

/// Insert or fully overwrite a transaction by its provider id
///
/// An existing row is only overwritten when it belongs to the same user and
/// link; otherwise the result is `InconsistentReference`.
fn upsert_transaction_in(
    conn: &Connection,
    link: &Link,
    account_id: i64,
    snapshot: &TransactionSnapshot,
) -> Result<i64> {
    let raw_json = if snapshot.raw.is_null() {
        None
    } else {
        Some(serde_json::to_string(&snapshot.raw)?)
    };

    let id: Option<i64> = conn
        .query_row(
            r#"
            INSERT INTO transactions (
                external_id, account_id, link_id, user_id, amount, date, authorized_date,
                pending, pending_transaction_id, payment_channel, name, merchant_name,
                primary_category, detailed_category, iso_currency_code, unofficial_currency_code,
                raw_json
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                account_id = excluded.account_id,
                amount = excluded.amount,
                date = excluded.date,
                authorized_date = excluded.authorized_date,
                pending = excluded.pending,
                pending_transaction_id = excluded.pending_transaction_id,
                payment_channel = excluded.payment_channel,
                name = excluded.name,
                merchant_name = excluded.merchant_name,
                primary_category = excluded.primary_category,
                detailed_category = excluded.detailed_category,
                iso_currency_code = excluded.iso_currency_code,
                unofficial_currency_code = excluded.unofficial_currency_code,
                raw_json = excluded.raw_json
            WHERE transactions.user_id = excluded.user_id
                AND transactions.link_id = excluded.link_id
            RETURNING id
            "#,
            params![
                snapshot.transaction_id,
                account_id,
                link.id,
                link.user_id,
                snapshot.amount,
                snapshot.date.to_string(),
                snapshot.authorized_date.map(|d| d.to_string()),
                snapshot.pending,
                snapshot.pending_transaction_id,
                snapshot.payment_channel,
                snapshot.name,
                snapshot.merchant_name,
                snapshot.primary_category,
                snapshot.detailed_category,
                snapshot.iso_currency_code,
                snapshot.unofficial_currency_code,
                raw_json,
            ],
            |row| row.get(0),
        )
        .optional()?;

    id.ok_or_else(|| {
        Error::InconsistentReference(format!(
            "Transaction {} is owned by another link",
            snapshot.transaction_id
        ))
    })
}

fn delete_by_external_id_in(
    conn: &Connection,
    user_id: &str,
    link_id: i64,
    external_ids: &[String],
) -> Result<usize> {
    let mut stmt = conn.prepare(
        "DELETE FROM transactions WHERE external_id = ? AND user_id = ? AND link_id = ?",
    )?;

    let mut deleted = 0;
    for external_id in external_ids {
        deleted += stmt.execute(params![external_id, user_id, link_id])?;
    }
    Ok(deleted)
}

impl Database {
    /// Insert or fully overwrite a transaction belonging to `link`
    pub fn upsert_transaction(
        &self,
        link: &Link,
        account_id: i64,
        snapshot: &TransactionSnapshot,
    ) -> Result<i64> {
        let conn = self.conn()?;
        upsert_transaction_in(&conn, link, account_id, snapshot)
    }

    /// Delete transactions by provider id, scoped to one user and link
    ///
    /// Ids that are unknown (or owned elsewhere) are ignored. Returns rows deleted.
    pub fn delete_transactions_by_external_id(
        &self,
        user_id: &str,
        link_id: i64,
        external_ids: &[String],
    ) -> Result<usize> {
        let conn = self.conn()?;
        delete_by_external_id_in(&conn, user_id, link_id, external_ids)
    }

    /// Apply one delta page and advance the link's cursor atomically
    ///
    /// Either every mutation of the page plus the cursor move is durable, or
    /// none of it is. An empty `next_cursor` leaves the stored cursor as is. `account_map` (external → internal account id) gains any
    /// placeholder accounts created, but only once the page has committed.
    pub fn commit_delta_page(
        &self,
        link: &Link,
        page: &DeltaPage,
        account_map: &mut HashMap<String, i64>,
    ) -> Result<SyncStats> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut created: HashMap<String, i64> = HashMap::new();

        for snapshot in page.added.iter().chain(page.modified.iter()) {
            let known = account_map
                .get(&snapshot.account_id)
                .or_else(|| created.get(&snapshot.account_id))
                .copied();

            let account_id = match known {
                Some(id) => id,
                None => {
                    let id =
                        ensure_placeholder(&tx, &link.user_id, link.id, &snapshot.account_id)?;
                    created.insert(snapshot.account_id.clone(), id);
                    id
                }
            };

            upsert_transaction_in(&tx, link, account_id, snapshot)?;
        }

        let deleted = delete_by_external_id_in(&tx, &link.user_id, link.id, &page.removed)?;

        if !page.next_cursor.is_empty() {
            tx.execute(
                "UPDATE links SET cursor = ? WHERE id = ?",
                params![page.next_cursor, link.id],
            )?;
        }

        tx.commit()?;

        account_map.extend(created);

        debug!(
            link_id = link.id,
            added = page.added.len(),
            modified = page.modified.len(),
            removed = page.removed.len(),
            deleted,
            "Committed delta page"
        );

        Ok(SyncStats {
            added: page.added.len() as u64,
            modified: page.modified.len() as u64,
            removed: page.removed.len() as u64,
        })
    }

    /// List transactions matching `filter`, newest first
    ///
    /// `limit = None` returns every match.
    pub fn list_transactions(
        &self,
        filter: TransactionFilter<'_>,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let filter = filter.build();

        let sql = format!(
            "SELECT {} FROM transactions t {} {} LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS, filter.where_clause, filter.order_clause
        );

        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.unwrap_or(-1);
        let offset = offset.max(0);

        let mut params = filter.params_refs();
        params.push(&limit);
        params.push(&offset);

        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params_from_iter(params), transaction_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Count transactions matching `filter`
    pub fn count_transactions(&self, filter: TransactionFilter<'_>) -> Result<i64> {
        let conn = self.conn()?;
        let filter = filter.build();

        let count: i64 = conn.query_row(
            &filter.build_count_query(),
            params_from_iter(filter.params_refs()),
            |row| row.get(0),
        )?;

        Ok(count)
    }
}
