//! Account operations

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Account, AccountSnapshot, Link};

/// Display name given to accounts first seen through a transaction
pub const PLACEHOLDER_ACCOUNT_NAME: &str = "Unclassified Account";
/// Account type given to placeholder accounts
pub const PLACEHOLDER_ACCOUNT_TYPE: &str = "other";

const ACCOUNT_COLUMNS: &str = "id, external_id, link_id, user_id, name, mask, account_type, \
     subtype, current_balance, available_balance, iso_currency_code, unofficial_currency_code";

fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        external_id: row.get(1)?,
        link_id: row.get(2)?,
        user_id: row.get(3)?,
        name: row.get(4)?,
        mask: row.get(5)?,
        account_type: row.get(6)?,
        subtype: row.get(7)?,
        current_balance: row.get(8)?,
        available_balance: row.get(9)?,
        iso_currency_code: row.get(10)?,
        unofficial_currency_code: row.get(11)?,
    })
}

/// Insert-if-absent a placeholder account, returning its id
///
/// An existing account is reused only if it belongs to the same user and link.
pub(super) fn ensure_placeholder(
    conn: &Connection,
    user_id: &str,
    link_id: i64,
    external_account_id: &str,
) -> Result<i64> {
    let inserted = conn.execute(
        r#"
        INSERT INTO accounts (external_id, link_id, user_id, name, account_type, current_balance)
        VALUES (?, ?, ?, ?, ?, 0)
        ON CONFLICT(external_id) DO NOTHING
        "#,
        params![
            external_account_id,
            link_id,
            user_id,
            PLACEHOLDER_ACCOUNT_NAME,
            PLACEHOLDER_ACCOUNT_TYPE
        ],
    )?;

    let (id, owner, owner_link): (i64, String, i64) = conn.query_row(
        "SELECT id, user_id, link_id FROM accounts WHERE external_id = ?",
        params![external_account_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    if owner != user_id || owner_link != link_id {
        return Err(Error::InconsistentReference(format!(
            "Account {} is owned by another link",
            external_account_id
        )));
    }

    if inserted > 0 {
        warn!(
            link_id,
            account = external_account_id,
            "Created placeholder for account missing from snapshot"
        );
    }

    Ok(id)
}

impl Database {
    /// Create or overwrite an account from a provider snapshot
    ///
    /// Balances and metadata are replaced, and the account is re-parented to
    /// `link` and its user, even when another user held it before. The
    /// snapshot is the provider's authoritative view of who owns the account.
    /// Placeholders never move an account (see `ensure_placeholder`).
    pub fn upsert_account(&self, link: &Link, snapshot: &AccountSnapshot) -> Result<i64> {
        let conn = self.conn()?;

        let id: i64 = conn.query_row(
            r#"
            INSERT INTO accounts (
                external_id, link_id, user_id, name, mask, account_type, subtype,
                current_balance, available_balance, iso_currency_code, unofficial_currency_code
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                link_id = excluded.link_id,
                user_id = excluded.user_id,
                name = excluded.name,
                mask = excluded.mask,
                account_type = excluded.account_type,
                subtype = excluded.subtype,
                current_balance = excluded.current_balance,
                available_balance = excluded.available_balance,
                iso_currency_code = excluded.iso_currency_code,
                unofficial_currency_code = excluded.unofficial_currency_code,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![
                snapshot.account_id,
                link.id,
                link.user_id,
                snapshot.name,
                snapshot.mask,
                snapshot.account_type,
                snapshot.subtype,
                snapshot.current_balance.unwrap_or(0.0),
                snapshot.available_balance,
                snapshot.iso_currency_code,
                snapshot.unofficial_currency_code,
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Resolve an account referenced by a transaction, creating a placeholder if unknown
    pub fn ensure_placeholder_account(
        &self,
        user_id: &str,
        link_id: i64,
        external_account_id: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        ensure_placeholder(&conn, user_id, link_id, external_account_id)
    }

    /// External account id → internal id for every account of a link
    pub fn account_id_map(&self, link_id: i64) -> Result<HashMap<String, i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT external_id, id FROM accounts WHERE link_id = ?")?;

        let map = stmt
            .query_map(params![link_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<HashMap<String, i64>, _>>()?;

        Ok(map)
    }

    /// List a user's accounts
    pub fn list_accounts_for_user(&self, user_id: &str) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE user_id = ? ORDER BY link_id, name, id",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map(params![user_id], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Get an account by its provider id
    pub fn get_account_by_external_id(&self, external_id: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!(
                    "SELECT {} FROM accounts WHERE external_id = ?",
                    ACCOUNT_COLUMNS
                ),
                params![external_id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }
}
