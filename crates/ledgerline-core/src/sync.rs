//! Incremental, cursor-based reconciliation of provider data into the ledger
//!
//! A sync refreshes the link's account snapshot, then walks the provider's
//! delta feed page by page from the link's stored cursor. Each page and its
//! cursor advance commit together, so an interrupted sync resumes exactly
//! where the last durable page left off.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::credentials::{CredentialResolver, StoredCredentials};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{BatchSyncReport, Link, LinkSyncFailure, SyncStats};
use crate::provider::{ProviderBackend, ProviderClient};

/// Default number of transactions requested per delta page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Syncs links against the provider
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    provider: ProviderClient,
    credentials: Arc<dyn CredentialResolver>,
    page_size: u32,
    timeout: Option<Duration>,
}

impl Reconciler {
    pub fn new(db: Database, provider: ProviderClient) -> Self {
        Self {
            db,
            provider,
            credentials: Arc::new(StoredCredentials),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: None,
        }
    }

    /// Apply page size and per-link deadline from configuration
    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.page_size = config.page_size.max(1);
        self.timeout = config.timeout;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sync one link owned by `user_id`
    ///
    /// Fails with `NotFound` if the link does not exist or belongs to someone
    /// else, `CredentialUnavailable` if its credential cannot be resolved, and
    /// `SyncFailed` (carrying the counts committed so far) for anything that
    /// goes wrong once the provider has been contacted.
    pub async fn sync_link(&self, user_id: &str, link_id: i64) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        self.sync_link_counting(user_id, link_id, &mut stats).await
    }

    /// Sync one link, giving up after `deadline`
    ///
    /// Pages committed before the deadline stay committed; the next sync
    /// resumes from them. A timeout surfaces as `SyncFailed` wrapping
    /// `Timeout`, carrying the counts of those pages.
    pub async fn sync_link_with_deadline(
        &self,
        user_id: &str,
        link_id: i64,
        deadline: Duration,
    ) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        let outcome =
            tokio::time::timeout(deadline, self.sync_link_counting(user_id, link_id, &mut stats))
                .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    link_id,
                    ?deadline,
                    added = stats.added,
                    modified = stats.modified,
                    removed = stats.removed,
                    "Link sync deadline elapsed"
                );
                Err(Error::SyncFailed {
                    link_id,
                    stats,
                    source: Box::new(Error::Timeout(format!(
                        "Sync of link {} did not finish within {:?}",
                        link_id, deadline
                    ))),
                })
            }
        }
    }

    /// Body of `sync_link`; `stats` is updated after every committed page so
    /// the counts survive the future being dropped at a deadline.
    async fn sync_link_counting(
        &self,
        user_id: &str,
        link_id: i64,
        stats: &mut SyncStats,
    ) -> Result<SyncStats> {
        let link = self.db.get_link_for_user(user_id, link_id)?;
        let credential = self.credentials.resolve_access_credential(&link)?;

        info!(
            link_id,
            provider = self.provider.name(),
            resume = link.cursor.is_some(),
            "Starting link sync"
        );

        if let Err(e) = self.apply_deltas(&link, &credential, stats).await {
            warn!(link_id, error = %e, added = stats.added, modified = stats.modified, removed = stats.removed, "Link sync failed");
            return Err(Error::SyncFailed {
                link_id,
                stats: *stats,
                source: Box::new(e),
            });
        }

        if link.institution_name.is_none() {
            self.refresh_metadata(&link, &credential).await;
        }

        info!(
            link_id,
            added = stats.added,
            modified = stats.modified,
            removed = stats.removed,
            "Link sync complete"
        );
        Ok(*stats)
    }

    /// Sync one link under the configured deadline, if any
    pub async fn sync_link_bounded(&self, user_id: &str, link_id: i64) -> Result<SyncStats> {
        match self.timeout {
            Some(deadline) => self.sync_link_with_deadline(user_id, link_id, deadline).await,
            None => self.sync_link(user_id, link_id).await,
        }
    }

    /// Sync every link of a user, one after another
    ///
    /// Best effort: a failing link is recorded in the report and the remaining
    /// links are still attempted. Partial progress of failed links counts
    /// towards the totals.
    pub async fn sync_all_links_for_user(&self, user_id: &str) -> Result<BatchSyncReport> {
        let links = self.db.list_links_for_user(user_id)?;
        let mut report = BatchSyncReport::default();

        for link in &links {
            match self.sync_link_bounded(user_id, link.id).await {
                Ok(stats) => {
                    report.synced_links += 1;
                    report.totals += stats;
                }
                Err(e) => {
                    let stats = match &e {
                        Error::SyncFailed { stats, .. } => *stats,
                        _ => SyncStats::default(),
                    };
                    report.totals += stats;
                    report.failed_links.push(LinkSyncFailure {
                        link_id: link.id,
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                        stats,
                    });
                }
            }
        }

        info!(
            user_id,
            links = links.len(),
            synced = report.synced_links,
            failed = report.failed_links.len(),
            "Batch sync complete"
        );
        Ok(report)
    }

    async fn apply_deltas(&self, link: &Link, credential: &str, stats: &mut SyncStats) -> Result<()> {
        // Accounts first so transactions can resolve their account references
        let snapshots = self.provider.fetch_accounts(credential).await?;
        for snapshot in &snapshots {
            self.db.upsert_account(link, snapshot)?;
        }
        let mut account_map = self.db.account_id_map(link.id)?;
        debug!(link_id = link.id, accounts = snapshots.len(), "Refreshed account snapshot");

        let mut cursor = link.cursor.clone();
        loop {
            let page = self
                .provider
                .fetch_transaction_delta(credential, cursor.as_deref(), self.page_size)
                .await?;

            *stats += self.db.commit_delta_page(link, &page, &mut account_map)?;
            // An empty cursor means the provider issued none; keep the old one
            if !page.next_cursor.is_empty() {
                cursor = Some(page.next_cursor);
            }

            if !page.has_more {
                break;
            }
        }

        self.db
            .finish_link_sync(link.id, cursor.as_deref(), Utc::now())?;
        Ok(())
    }

    /// Best effort: a metadata failure never fails the sync
    async fn refresh_metadata(&self, link: &Link, credential: &str) {
        match self.provider.fetch_link_metadata(credential).await {
            Ok(metadata) => {
                if let Err(e) = self.db.update_link_metadata(link.id, &metadata) {
                    warn!(link_id = link.id, error = %e, "Failed to store link metadata");
                }
            }
            Err(e) => warn!(link_id = link.id, error = %e, "Failed to fetch link metadata"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TransactionFilter;
    use crate::models::{AccountSnapshot, DeltaPage, LinkMetadata, NewLink, TransactionSnapshot};
    use crate::provider::{HttpProvider, LinkScript, ScriptedFailure, ScriptedProvider};
    use crate::test_utils::{MockProviderServer, MOCK_ACCESS_TOKEN};
    use chrono::NaiveDate;
    use serde_json::json;

    const USER: &str = "user-1";
    const TOKEN: &str = "token-a";

    fn txn(id: &str, account: &str, amount: f64, day: u32) -> TransactionSnapshot {
        TransactionSnapshot {
            transaction_id: id.to_string(),
            account_id: account.to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            authorized_date: None,
            pending: false,
            pending_transaction_id: None,
            payment_channel: None,
            name: format!("Merchant {}", id),
            merchant_name: None,
            primary_category: None,
            detailed_category: None,
            iso_currency_code: Some("USD".to_string()),
            unofficial_currency_code: None,
            raw: json!({ "transaction_id": id }),
        }
    }

    fn checking() -> AccountSnapshot {
        AccountSnapshot {
            account_id: "acc-1".to_string(),
            name: "Checking".to_string(),
            mask: Some("1111".to_string()),
            account_type: "depository".to_string(),
            subtype: Some("checking".to_string()),
            current_balance: Some(1000.0),
            available_balance: Some(950.0),
            iso_currency_code: Some("USD".to_string()),
            unofficial_currency_code: None,
        }
    }

    /// Three pages: adds, a modify plus a transaction on an unknown account, a removal
    fn script() -> LinkScript {
        LinkScript {
            accounts: vec![checking()],
            pages: vec![
                DeltaPage {
                    added: vec![txn("t1", "acc-1", 10.0, 1), txn("t2", "acc-1", 20.0, 2)],
                    next_cursor: "c1".to_string(),
                    has_more: true,
                    ..Default::default()
                },
                DeltaPage {
                    added: vec![txn("t3", "acc-ghost", 7.5, 3)],
                    modified: vec![txn("t1", "acc-1", 11.0, 1)],
                    next_cursor: "c2".to_string(),
                    has_more: true,
                    ..Default::default()
                },
                DeltaPage {
                    removed: vec!["t2".to_string()],
                    next_cursor: "c3".to_string(),
                    has_more: false,
                    ..Default::default()
                },
            ],
            metadata: LinkMetadata {
                institution_id: Some("ins_1".to_string()),
                institution_name: Some("First Bank".to_string()),
            },
        }
    }

    fn add_link(db: &Database, user: &str, external_id: &str, credential: &str) -> Link {
        db.upsert_link(&NewLink {
            user_id: user.to_string(),
            external_id: external_id.to_string(),
            access_credential: credential.to_string(),
            institution_id: None,
            institution_name: None,
        })
        .unwrap()
    }

    fn setup() -> (Database, ScriptedProvider, Reconciler, Link) {
        let db = Database::in_memory().unwrap();
        let provider = ScriptedProvider::new().with_link(TOKEN, script());
        let reconciler = Reconciler::new(db.clone(), ProviderClient::Scripted(provider.clone()));
        let link = add_link(&db, USER, "item-1", TOKEN);
        (db, provider, reconciler, link)
    }

    fn ledger(db: &Database) -> Vec<(String, f64)> {
        let mut rows: Vec<(String, f64)> = db
            .list_transactions(TransactionFilter::new().user_id(USER), None, 0)
            .unwrap()
            .into_iter()
            .map(|t| (t.external_id, t.amount))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    #[tokio::test]
    async fn test_full_sync() {
        let (db, provider, reconciler, link) = setup();

        let stats = reconciler.sync_link(USER, link.id).await.unwrap();
        assert_eq!(
            stats,
            SyncStats {
                added: 3,
                modified: 1,
                removed: 1
            }
        );

        assert_eq!(
            ledger(&db),
            vec![("t1".to_string(), 11.0), ("t3".to_string(), 7.5)]
        );

        let link = db.get_link(link.id).unwrap().unwrap();
        assert_eq!(link.cursor.as_deref(), Some("c3"));
        assert!(link.last_synced_at.is_some());
        assert_eq!(link.institution_name.as_deref(), Some("First Bank"));

        // Unknown account became a placeholder on this link
        let ghost = db.get_account_by_external_id("acc-ghost").unwrap().unwrap();
        assert_eq!(ghost.name, "Unclassified Account");
        assert_eq!(ghost.link_id, link.id);

        let requests = provider.delta_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].1, None);
        assert_eq!(requests[2].1.as_deref(), Some("c2"));
        assert!(requests.iter().all(|(_, _, count)| *count == DEFAULT_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_resync_is_noop() {
        let (db, provider, reconciler, link) = setup();
        reconciler.sync_link(USER, link.id).await.unwrap();
        let before = ledger(&db);

        let stats = reconciler.sync_link(USER, link.id).await.unwrap();
        assert_eq!(stats, SyncStats::default());
        assert_eq!(ledger(&db), before);
        assert_eq!(provider.delta_requests()[3].1.as_deref(), Some("c3"));
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_link() {
        let (db, _provider, reconciler, link) = setup();
        assert!(matches!(
            reconciler.sync_link("someone-else", link.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            reconciler.sync_link(USER, 999).await,
            Err(Error::NotFound(_))
        ));
        assert!(db.get_link(link.id).unwrap().unwrap().cursor.is_none());
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (db, provider, reconciler, _link) = setup();
        let blank = add_link(&db, USER, "item-blank", "");

        let err = reconciler.sync_link(USER, blank.id).await.unwrap_err();
        assert!(matches!(err, Error::CredentialUnavailable(_)));
        assert!(provider.delta_requests().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_committed_progress_and_resumes() {
        let (db, provider, reconciler, link) = setup();
        provider.fail_delta_at(TOKEN, Some("c1"), ScriptedFailure::Unavailable);

        let err = reconciler.sync_link(USER, link.id).await.unwrap_err();
        match &err {
            Error::SyncFailed {
                link_id,
                stats,
                source,
            } => {
                assert_eq!(*link_id, link.id);
                assert_eq!(stats.added, 2);
                assert_eq!(stats.total(), 2);
                assert!(matches!(**source, Error::ProviderUnavailable(_)));
            }
            other => panic!("expected SyncFailed, got {:?}", other),
        }
        assert!(err.is_retryable());

        let stored = db.get_link(link.id).unwrap().unwrap();
        assert_eq!(stored.cursor.as_deref(), Some("c1"));
        assert!(stored.last_synced_at.is_none());

        // Resume and compare with an uninterrupted run
        let resumed = reconciler.sync_link(USER, link.id).await.unwrap();
        assert_eq!(resumed.added, 1);
        assert_eq!(resumed.removed, 1);

        let (fresh_db, _p, fresh, fresh_link) = setup();
        fresh.sync_link(USER, fresh_link.id).await.unwrap();
        assert_eq!(ledger(&db), ledger(&fresh_db));
        assert_eq!(
            db.get_link(link.id).unwrap().unwrap().cursor,
            fresh_db.get_link(fresh_link.id).unwrap().unwrap().cursor
        );
    }

    #[tokio::test]
    async fn test_rejected_credential_is_not_retryable() {
        let (_db, provider, reconciler, link) = setup();
        provider.fail_accounts(TOKEN, ScriptedFailure::Rejected);

        let err = reconciler.sync_link(USER, link.id).await.unwrap_err();
        assert!(matches!(err, Error::SyncFailed { .. }));
        assert_eq!(err.kind(), "provider_rejected");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_inconsistent_account_reference() {
        let (db, _provider, reconciler, link) = setup();
        // Another user's link already owns the account the second page references
        let other = add_link(&db, "user-2", "item-2", "token-b");
        db.ensure_placeholder_account("user-2", other.id, "acc-ghost")
            .unwrap();

        let err = reconciler.sync_link(USER, link.id).await.unwrap_err();
        assert_eq!(err.kind(), "inconsistent_reference");
        if let Error::SyncFailed { stats, .. } = err {
            assert_eq!(stats.added, 2);
        }
        assert_eq!(
            db.get_link(link.id).unwrap().unwrap().cursor.as_deref(),
            Some("c1")
        );
    }

    #[tokio::test]
    async fn test_deadline() {
        let db = Database::in_memory().unwrap();
        let provider = ScriptedProvider::new()
            .with_link(TOKEN, script())
            .with_latency(Duration::from_millis(500));
        let reconciler = Reconciler::new(db.clone(), ProviderClient::Scripted(provider));
        let link = add_link(&db, USER, "item-1", TOKEN);

        let err = reconciler
            .sync_link_with_deadline(USER, link.id, Duration::from_millis(50))
            .await
            .unwrap_err();
        match &err {
            Error::SyncFailed { stats, source, .. } => {
                assert_eq!(*stats, SyncStats::default());
                assert!(matches!(**source, Error::Timeout(_)));
            }
            other => panic!("expected SyncFailed, got {:?}", other),
        }
        assert_eq!(err.kind(), "timeout");
        assert!(err.is_retryable());
        assert!(db.get_link(link.id).unwrap().unwrap().cursor.is_none());
    }

    #[tokio::test]
    async fn test_deadline_reports_committed_pages() {
        let db = Database::in_memory().unwrap();
        let provider = ScriptedProvider::new()
            .with_link(TOKEN, script())
            .with_latency(Duration::from_millis(300));
        let reconciler = Reconciler::new(db.clone(), ProviderClient::Scripted(provider))
            .with_config(&SyncConfig {
                page_size: DEFAULT_PAGE_SIZE,
                timeout: Some(Duration::from_millis(450)),
            });
        let link = add_link(&db, USER, "item-1", TOKEN);

        // First page lands at ~300ms, the second fetch outlives the deadline
        let report = reconciler.sync_all_links_for_user(USER).await.unwrap();
        assert_eq!(report.synced_links, 0);
        let failure = &report.failed_links[0];
        assert_eq!(failure.kind, "timeout");
        assert!(failure.retryable);
        assert_eq!(failure.stats.added, 2);
        assert_eq!(report.totals.added, 2);

        assert_eq!(ledger(&db).len(), 2);
        let stored = db.get_link(link.id).unwrap().unwrap();
        assert_eq!(stored.cursor.as_deref(), Some("c1"));
        assert!(stored.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_empty_backfill_leaves_link_unsynced_cursor() {
        let db = Database::in_memory().unwrap();
        let provider = ScriptedProvider::new().with_link(TOKEN, LinkScript::default());
        let reconciler = Reconciler::new(db.clone(), ProviderClient::Scripted(provider.clone()));
        let link = add_link(&db, USER, "item-empty", TOKEN);

        let stats = reconciler.sync_link(USER, link.id).await.unwrap();
        assert_eq!(stats, SyncStats::default());

        let stored = db.get_link(link.id).unwrap().unwrap();
        assert!(stored.cursor.is_none());
        assert!(stored.last_synced_at.is_some());

        // Next sync still starts from a full backfill
        reconciler.sync_link(USER, link.id).await.unwrap();
        assert!(provider.delta_requests().iter().all(|(_, cursor, _)| cursor.is_none()));
    }

    #[tokio::test]
    async fn test_batch_sync_is_best_effort() {
        let (db, provider, reconciler, first) = setup();
        // Unknown to the provider, so it is rejected
        let broken = add_link(&db, USER, "item-broken", "token-unknown");
        let third = add_link(&db, USER, "item-3", "token-c");
        provider.with_link(
            "token-c",
            LinkScript {
                pages: vec![DeltaPage {
                    added: vec![txn("c-1", "acc-c", 5.0, 4)],
                    next_cursor: "z1".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        let report = reconciler.sync_all_links_for_user(USER).await.unwrap();
        assert_eq!(report.synced_links, 2);
        assert!(!report.is_complete());
        assert_eq!(report.failed_links.len(), 1);

        let failure = &report.failed_links[0];
        assert_eq!(failure.link_id, broken.id);
        assert_eq!(failure.kind, "provider_rejected");
        assert!(!failure.retryable);
        assert_eq!(failure.stats, SyncStats::default());

        assert_eq!(report.totals.added, 4);
        assert!(db.get_link(first.id).unwrap().unwrap().last_synced_at.is_some());
        assert!(db.get_link(third.id).unwrap().unwrap().last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_batch_counts_partial_progress() {
        let (_db, provider, reconciler, _link) = setup();
        provider.fail_delta_at(TOKEN, Some("c2"), ScriptedFailure::Unavailable);

        let report = reconciler.sync_all_links_for_user(USER).await.unwrap();
        assert_eq!(report.synced_links, 0);
        assert_eq!(report.failed_links[0].stats.total(), 4);
        assert_eq!(report.totals.total(), 4);
        assert!(report.failed_links[0].retryable);
    }

    #[tokio::test]
    async fn test_metadata_failure_does_not_fail_sync() {
        let (db, provider, reconciler, link) = setup();
        provider.fail_metadata(TOKEN, ScriptedFailure::Unavailable);

        reconciler.sync_link(USER, link.id).await.unwrap();
        let link = db.get_link(link.id).unwrap().unwrap();
        assert!(link.institution_name.is_none());
        assert_eq!(link.cursor.as_deref(), Some("c3"));
    }

    #[tokio::test]
    async fn test_sync_over_http() {
        let server = MockProviderServer::start().await;
        let db = Database::in_memory().unwrap();
        let provider = HttpProvider::new(&server.url(), "client-id", "secret").unwrap();
        let reconciler =
            Reconciler::new(db.clone(), ProviderClient::Http(provider)).with_page_size(2);
        let link = add_link(&db, USER, "item-mock", MOCK_ACCESS_TOKEN);

        let stats = reconciler.sync_link(USER, link.id).await.unwrap();
        assert_eq!(
            stats,
            SyncStats {
                added: 3,
                modified: 1,
                removed: 1
            }
        );

        let rows = db
            .list_transactions(TransactionFilter::new().user_id(USER), None, 0)
            .unwrap();
        assert_eq!(rows.len(), 2);
        let market = rows.iter().find(|t| t.external_id == "tx-2").unwrap();
        assert_eq!(market.amount, 44.0);
        assert_eq!(market.primary_category.as_deref(), Some("ENTERTAINMENT"));

        let link = db.get_link(link.id).unwrap().unwrap();
        assert_eq!(link.cursor.as_deref(), Some("cursor-2"));
        assert_eq!(link.institution_name.as_deref(), Some("First Platypus Bank"));
        assert_eq!(db.list_accounts_for_user(USER).unwrap().len(), 2);
    }
}
