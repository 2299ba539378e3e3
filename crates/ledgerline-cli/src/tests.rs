//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use chrono::NaiveDate;
use ledgerline_core::db::Database;
use ledgerline_core::{
    AccountSnapshot, DeltaPage, LedgerConfig, LinkScript, NewLink, ProviderClient, Reconciler,
    ScriptedProvider, TransactionSnapshot,
};

use crate::commands::{self, money, truncate, TransactionQuery};

const USER: &str = "tester";

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

async fn seeded_db() -> Database {
    let db = setup_test_db();
    commands::cmd_demo(&db, USER, false).await.unwrap();
    db
}

fn register_link(db: &Database, token: &str) -> i64 {
    db.upsert_link(&NewLink {
        user_id: USER.to_string(),
        external_id: format!("item-{}", token),
        access_credential: token.to_string(),
        institution_id: None,
        institution_name: Some("Test Bank".to_string()),
    })
    .unwrap()
    .id
}

fn one_page_script() -> LinkScript {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    LinkScript {
        accounts: vec![AccountSnapshot {
            account_id: "acc-1".to_string(),
            name: "Checking".to_string(),
            mask: Some("1234".to_string()),
            account_type: "depository".to_string(),
            subtype: Some("checking".to_string()),
            current_balance: Some(100.0),
            available_balance: Some(100.0),
            iso_currency_code: Some("USD".to_string()),
            unofficial_currency_code: None,
        }],
        pages: vec![DeltaPage {
            added: vec![TransactionSnapshot {
                transaction_id: "tx-1".to_string(),
                account_id: "acc-1".to_string(),
                amount: 12.5,
                date,
                authorized_date: None,
                pending: false,
                pending_transaction_id: None,
                payment_channel: None,
                name: "CORNER CAFE".to_string(),
                merchant_name: Some("Corner Cafe".to_string()),
                primary_category: Some("FOOD_AND_DRINK".to_string()),
                detailed_category: None,
                iso_currency_code: Some("USD".to_string()),
                unofficial_currency_code: None,
                raw: serde_json::Value::Null,
            }],
            next_cursor: "c1".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
    assert_eq!(truncate("this is a long merchant", 10), "this is...");
}

#[test]
fn test_truncate_multibyte() {
    assert_eq!(truncate("café café café", 8), "café ...");
}

#[test]
fn test_money() {
    assert_eq!(money(12.5), "$12.50");
    assert_eq!(money(-3650.0), "-$3650.00");
    assert_eq!(money(0.0), "$0.00");
}

// ========== Core Command Tests ==========

#[test]
fn test_cmd_init_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    // Reopening an initialized database works
    let db = commands::open_db(&path, true).unwrap();
    assert!(db.list_links_for_user(USER).unwrap().is_empty());
}

#[test]
fn test_load_config_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = commands::load_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.detection.lookback_days, 180);
}

#[test]
fn test_load_config_rejects_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sync]\npage_size = 0\n").unwrap();
    assert!(commands::load_config(Some(&path)).is_err());
}

// ========== Link Command Tests ==========

#[test]
fn test_cmd_link_add_and_list() {
    let db = setup_test_db();
    commands::cmd_link_add(&db, USER, "item-1", "token-1", Some("ins_1"), Some("First Bank"), false)
        .unwrap();
    commands::cmd_link_add(&db, USER, "item-1", "token-2", None, None, true).unwrap();

    let links = db.list_links_for_user(USER).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].access_credential, "token-2");

    assert!(commands::cmd_links(&db, USER, false).is_ok());
    assert!(commands::cmd_links(&db, USER, true).is_ok());
}

#[test]
fn test_cmd_links_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_links(&db, USER, false).is_ok());
}

// ========== Sync Command Tests ==========

#[tokio::test]
async fn test_run_sync_all_links() {
    let db = setup_test_db();
    register_link(&db, "good");
    let provider = ScriptedProvider::new().with_link("good", one_page_script());
    let reconciler = Reconciler::new(db.clone(), ProviderClient::Scripted(provider));

    commands::run_sync(&reconciler, USER, None, false).await.unwrap();

    let accounts = db.list_accounts_for_user(USER).unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].current_balance, 100.0);
}

#[tokio::test]
async fn test_run_sync_single_link() {
    let db = setup_test_db();
    let link_id = register_link(&db, "good");
    let provider = ScriptedProvider::new().with_link("good", one_page_script());
    let reconciler = Reconciler::new(db.clone(), ProviderClient::Scripted(provider));

    commands::run_sync(&reconciler, USER, Some(link_id), true).await.unwrap();
    assert_eq!(
        db.get_link(link_id).unwrap().unwrap().cursor.as_deref(),
        Some("c1")
    );
}

#[tokio::test]
async fn test_run_sync_reports_failed_links() {
    let db = setup_test_db();
    register_link(&db, "good");
    register_link(&db, "revoked");
    let provider = ScriptedProvider::new().with_link("good", one_page_script());
    let reconciler = Reconciler::new(db.clone(), ProviderClient::Scripted(provider));

    let err = commands::run_sync(&reconciler, USER, None, false).await.unwrap_err();
    assert!(err.to_string().contains("1 link(s) failed"));

    // The healthy link still synced
    assert_eq!(db.list_accounts_for_user(USER).unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_sync_unknown_link() {
    let db = setup_test_db();
    let reconciler = Reconciler::new(
        db.clone(),
        ProviderClient::Scripted(ScriptedProvider::new()),
    );
    assert!(commands::run_sync(&reconciler, USER, Some(42), false).await.is_err());
}

#[tokio::test]
async fn test_cmd_sync_requires_provider_credentials() {
    let db = setup_test_db();
    let config = LedgerConfig::default();
    let err = commands::cmd_sync(&db, &config, USER, None, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Provider is not configured"));
}

// ========== Demo-backed Command Tests ==========

#[tokio::test]
async fn test_cmd_demo_is_repeatable() {
    let db = seeded_db().await;
    let links = db.list_links_for_user(USER).unwrap();
    assert_eq!(links.len(), 1);

    commands::cmd_demo(&db, USER, true).await.unwrap();
    assert_eq!(db.list_links_for_user(USER).unwrap().len(), 1);
}

#[tokio::test]
async fn test_report_commands_on_demo_data() {
    let db = seeded_db().await;
    let config = LedgerConfig::default();

    for json in [false, true] {
        assert!(commands::cmd_accounts(&db, USER, json).is_ok());
        assert!(commands::cmd_dashboard(&db, &config, USER, json).is_ok());
        assert!(commands::cmd_insights(&db, &config, USER, json).is_ok());
        assert!(commands::cmd_subscriptions(&db, &config, USER, json).is_ok());
        assert!(commands::cmd_transactions(&db, USER, &TransactionQuery::default(), json).is_ok());
    }
}

#[tokio::test]
async fn test_cmd_simulate_cancel() {
    let db = seeded_db().await;
    let config = LedgerConfig::default();

    let merchants = vec!["netflix".to_string(), "Not A Merchant".to_string()];
    assert!(commands::cmd_simulate_cancel(&db, &config, USER, &merchants, false).is_ok());
    assert!(commands::cmd_simulate_cancel(&db, &config, USER, &merchants, true).is_ok());

    let unknown = vec!["Not A Merchant".to_string()];
    assert!(commands::cmd_simulate_cancel(&db, &config, USER, &unknown, false).is_ok());
}

#[test]
fn test_reports_on_empty_ledger() {
    let db = setup_test_db();
    let config = LedgerConfig::default();

    assert!(commands::cmd_accounts(&db, USER, false).is_ok());
    assert!(commands::cmd_dashboard(&db, &config, USER, false).is_ok());
    assert!(commands::cmd_insights(&db, &config, USER, false).is_ok());
    assert!(commands::cmd_subscriptions(&db, &config, USER, false).is_ok());
    assert!(commands::cmd_transactions(&db, USER, &TransactionQuery::default(), false).is_ok());
}

// ========== Transaction Query Tests ==========

#[tokio::test]
async fn test_query_transactions_pages() {
    let db = seeded_db().await;
    let query = TransactionQuery {
        page_size: 10,
        ..Default::default()
    };

    let first = commands::query_transactions(&db, USER, &query).unwrap();
    assert_eq!(first.transactions.len(), 10);
    assert!(first.total > 10);

    let second = commands::query_transactions(&db, USER, &TransactionQuery { page: 2, ..query.clone() })
        .unwrap();
    assert_eq!(second.total, first.total);
    assert!(second
        .transactions
        .iter()
        .all(|t| first.transactions.iter().all(|f| f.id != t.id)));

    // Past the end
    let beyond = commands::query_transactions(&db, USER, &TransactionQuery { page: 1000, ..query })
        .unwrap();
    assert!(beyond.transactions.is_empty());
}

#[tokio::test]
async fn test_query_transactions_filters() {
    let db = seeded_db().await;
    let query = TransactionQuery {
        category: Some("entertainment".to_string()),
        page_size: 500,
        ..Default::default()
    };

    let page = commands::query_transactions(&db, USER, &query).unwrap();
    assert!(page.total > 0);
    assert!(page
        .transactions
        .iter()
        .all(|t| t.primary_category.as_deref() == Some("ENTERTAINMENT")));
}

#[test]
fn test_query_transactions_rejects_bad_input() {
    let db = setup_test_db();

    let zero_page = TransactionQuery {
        page: 0,
        ..Default::default()
    };
    assert!(commands::query_transactions(&db, USER, &zero_page).is_err());

    let zero_size = TransactionQuery {
        page_size: 0,
        ..Default::default()
    };
    assert!(commands::query_transactions(&db, USER, &zero_size).is_err());

    let inverted = TransactionQuery {
        from: NaiveDate::from_ymd_opt(2024, 5, 1),
        to: NaiveDate::from_ymd_opt(2024, 4, 1),
        ..Default::default()
    };
    assert!(commands::query_transactions(&db, USER, &inverted).is_err());
}
