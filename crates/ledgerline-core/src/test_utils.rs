//! Test utilities for ledgerline-core
//!
//! Provides a mock aggregation provider speaking the Plaid-shaped JSON API,
//! so `HttpProvider` can be exercised end-to-end without network access.

use axum::{
    extract::Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// The only access token the mock server accepts
pub const MOCK_ACCESS_TOKEN: &str = "access-sandbox-mock";
/// Cursor that makes `/transactions/sync` answer with a 500
pub const MOCK_FAILING_CURSOR: &str = "cursor-boom";

/// Mock provider server for tests
pub struct MockProviderServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/accounts/get", post(handle_accounts))
            .route("/transactions/sync", post(handle_sync))
            .route("/item/get", post(handle_item))
            .route("/institutions/get_by_id", post(handle_institution));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct AccessBody {
    access_token: String,
    cursor: Option<String>,
}

fn provider_error(status: StatusCode, error_type: &str, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error_type": error_type,
            "error_code": code,
            "error_message": message,
            "display_message": null,
            "request_id": "mock-request",
        })),
    )
        .into_response()
}

/// Reject missing client headers or unknown tokens the way the real API does
fn check_access(headers: &HeaderMap, token: &str) -> Option<Response> {
    if !headers.contains_key("plaid-client-id") || !headers.contains_key("plaid-secret") {
        return Some(provider_error(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "MISSING_FIELDS",
            "client_id and secret are required",
        ));
    }
    if token != MOCK_ACCESS_TOKEN {
        return Some(provider_error(
            StatusCode::BAD_REQUEST,
            "ITEM_ERROR",
            "ITEM_LOGIN_REQUIRED",
            "the login details of this item have changed",
        ));
    }
    None
}

async fn handle_accounts(headers: HeaderMap, Json(body): Json<AccessBody>) -> Response {
    if let Some(rejection) = check_access(&headers, &body.access_token) {
        return rejection;
    }

    Json(json!({
        "accounts": [
            {
                "account_id": "acc-checking",
                "name": "Everyday Checking",
                "mask": "0000",
                "type": "depository",
                "subtype": "checking",
                "balances": {
                    "current": 500.0,
                    "available": 480.0,
                    "iso_currency_code": "USD",
                    "unofficial_currency_code": null
                }
            },
            {
                "account_id": "acc-card",
                "name": "Rewards Card",
                "mask": "3333",
                "type": "credit",
                "subtype": "credit card",
                "balances": {
                    "current": 200.0,
                    "available": 800.0,
                    "iso_currency_code": "USD",
                    "unofficial_currency_code": null
                }
            }
        ],
        "item": { "item_id": "item-mock", "institution_id": "ins_109508" },
        "request_id": "mock-request"
    }))
    .into_response()
}

fn wire_transaction(
    id: &str,
    account: &str,
    amount: f64,
    date: &str,
    merchant: &str,
    category: &str,
) -> Value {
    json!({
        "transaction_id": id,
        "account_id": account,
        "amount": amount,
        "date": date,
        "authorized_date": date,
        "pending": false,
        "pending_transaction_id": null,
        "payment_channel": "online",
        "name": merchant.to_uppercase(),
        "merchant_name": merchant,
        "personal_finance_category": { "primary": category, "detailed": format!("{}_OTHER", category) },
        "iso_currency_code": "USD",
        "unofficial_currency_code": null,
        "location": { "city": null }
    })
}

async fn handle_sync(headers: HeaderMap, Json(body): Json<AccessBody>) -> Response {
    if let Some(rejection) = check_access(&headers, &body.access_token) {
        return rejection;
    }

    let page = match body.cursor.as_deref() {
        None | Some("") => json!({
            "added": [
                wire_transaction("tx-1", "acc-checking", 15.99, "2024-03-01", "Netflix", "ENTERTAINMENT"),
                wire_transaction("tx-2", "acc-card", 42.10, "2024-03-02", "Corner Market", "FOOD_AND_DRINK"),
                wire_transaction("tx-3", "acc-checking", -1200.0, "2024-03-03", "Payroll", "INCOME"),
            ],
            "modified": [],
            "removed": [],
            "next_cursor": "cursor-1",
            "has_more": true
        }),
        Some("cursor-1") => json!({
            "added": [],
            "modified": [
                wire_transaction("tx-2", "acc-card", 44.00, "2024-03-02", "Corner Market", "ENTERTAINMENT"),
            ],
            "removed": [ { "transaction_id": "tx-1" } ],
            "next_cursor": "cursor-2",
            "has_more": false
        }),
        Some("cursor-2") => json!({
            "added": [],
            "modified": [],
            "removed": [],
            "next_cursor": "cursor-2",
            "has_more": false
        }),
        Some(MOCK_FAILING_CURSOR) => {
            return provider_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "API_ERROR",
                "INTERNAL_SERVER_ERROR",
                "an unexpected error occurred",
            )
        }
        Some(_) => {
            return provider_error(
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                "INVALID_CURSOR",
                "cursor not recognized",
            )
        }
    };

    Json(page).into_response()
}

async fn handle_item(headers: HeaderMap, Json(body): Json<AccessBody>) -> Response {
    if let Some(rejection) = check_access(&headers, &body.access_token) {
        return rejection;
    }

    Json(json!({
        "item": { "item_id": "item-mock", "institution_id": "ins_109508" },
        "request_id": "mock-request"
    }))
    .into_response()
}

async fn handle_institution(Json(body): Json<Value>) -> Response {
    match body["institution_id"].as_str() {
        Some("ins_109508") => Json(json!({
            "institution": { "institution_id": "ins_109508", "name": "First Platypus Bank" }
        }))
        .into_response(),
        _ => provider_error(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "INVALID_INSTITUTION",
            "institution not found",
        ),
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A settled ledger transaction for pure detection/aggregation tests
pub fn ledger_transaction(
    external_id: &str,
    merchant: &str,
    amount: f64,
    date: chrono::NaiveDate,
) -> crate::models::Transaction {
    crate::models::Transaction {
        id: 0,
        external_id: external_id.to_string(),
        account_id: 1,
        link_id: 1,
        user_id: "user-1".to_string(),
        amount,
        date,
        authorized_date: None,
        pending: false,
        pending_transaction_id: None,
        payment_channel: None,
        name: merchant.to_uppercase(),
        merchant_name: Some(merchant.to_string()),
        primary_category: None,
        detailed_category: None,
        iso_currency_code: Some("USD".to_string()),
        unofficial_currency_code: None,
        raw_json: None,
        created_at: chrono::Utc::now(),
    }
}

/// Provider snapshot of a settled transaction, for seeding a ledger through `commit_delta_page`
pub fn transaction_snapshot(
    external_id: &str,
    account_id: &str,
    merchant: &str,
    amount: f64,
    date: chrono::NaiveDate,
) -> crate::models::TransactionSnapshot {
    crate::models::TransactionSnapshot {
        transaction_id: external_id.to_string(),
        account_id: account_id.to_string(),
        amount,
        date,
        authorized_date: None,
        pending: false,
        pending_transaction_id: None,
        payment_channel: None,
        name: merchant.to_uppercase(),
        merchant_name: Some(merchant.to_string()),
        primary_category: None,
        detailed_category: None,
        iso_currency_code: Some("USD".to_string()),
        unofficial_currency_code: None,
        raw: Value::Null,
    }
}
