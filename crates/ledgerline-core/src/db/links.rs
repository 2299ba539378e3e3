//! Link operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Link, LinkMetadata, NewLink};

const LINK_COLUMNS: &str = "id, user_id, external_id, access_credential, institution_id, \
     institution_name, cursor, last_synced_at, created_at";

fn link_from_row(row: &Row) -> rusqlite::Result<Link> {
    let last_synced_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;

    Ok(Link {
        id: row.get(0)?,
        user_id: row.get(1)?,
        external_id: row.get(2)?,
        access_credential: row.get(3)?,
        institution_id: row.get(4)?,
        institution_name: row.get(5)?,
        cursor: row.get(6)?,
        last_synced_at: last_synced_at.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Register a link, or refresh the credential and institution of an existing one
    ///
    /// The sync cursor of an existing link is left untouched. A provider link id
    /// already owned by another user is rejected.
    pub fn upsert_link(&self, link: &NewLink) -> Result<Link> {
        let conn = self.conn()?;

        let owner: Option<String> = conn
            .query_row(
                "SELECT user_id FROM links WHERE external_id = ?",
                params![link.external_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(owner) = owner {
            if owner != link.user_id {
                return Err(Error::InconsistentReference(format!(
                    "Link {} belongs to another user",
                    link.external_id
                )));
            }
        }

        let sql = format!(
            r#"
            INSERT INTO links (user_id, external_id, access_credential, institution_id, institution_name)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                access_credential = excluded.access_credential,
                institution_id = COALESCE(excluded.institution_id, links.institution_id),
                institution_name = COALESCE(excluded.institution_name, links.institution_name)
            RETURNING {}
            "#,
            LINK_COLUMNS
        );

        let stored = conn.query_row(
            &sql,
            params![
                link.user_id,
                link.external_id,
                link.access_credential,
                link.institution_id,
                link.institution_name,
            ],
            link_from_row,
        )?;

        Ok(stored)
    }

    /// Get a link by ID regardless of owner
    pub fn get_link(&self, link_id: i64) -> Result<Option<Link>> {
        let conn = self.conn()?;
        let link = conn
            .query_row(
                &format!("SELECT {} FROM links WHERE id = ?", LINK_COLUMNS),
                params![link_id],
                link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    /// Get a link that must belong to `user_id`
    pub fn get_link_for_user(&self, user_id: &str, link_id: i64) -> Result<Link> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM links WHERE id = ? AND user_id = ?",
                LINK_COLUMNS
            ),
            params![link_id, user_id],
            link_from_row,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("Link {} not found", link_id)))
    }

    /// List a user's links in creation order
    pub fn list_links_for_user(&self, user_id: &str) -> Result<Vec<Link>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM links WHERE user_id = ? ORDER BY id",
            LINK_COLUMNS
        ))?;

        let links = stmt
            .query_map(params![user_id], link_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(links)
    }

    /// Fill in institution details reported by the provider
    pub fn update_link_metadata(&self, link_id: i64, metadata: &LinkMetadata) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE links SET
                institution_id = COALESCE(?, institution_id),
                institution_name = COALESCE(?, institution_name)
            WHERE id = ?
            "#,
            params![metadata.institution_id, metadata.institution_name, link_id],
        )?;
        Ok(())
    }

    /// Record the end of a successful sync: final cursor and timestamp
    pub fn finish_link_sync(
        &self,
        link_id: i64,
        cursor: Option<&str>,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE links SET cursor = ?, last_synced_at = ? WHERE id = ?",
            params![cursor, format_datetime(&synced_at), link_id],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("Link {} not found", link_id)));
        }
        Ok(())
    }
}
