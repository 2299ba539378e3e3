//! HTTP backend for the Plaid-shaped aggregation API
//!
//! Endpoints used:
//! - `POST /accounts/get`
//! - `POST /transactions/sync`
//! - `POST /item/get` (+ `POST /institutions/get_by_id` for the display name)
//!
//! Client id and secret travel as `PLAID-CLIENT-ID` / `PLAID-SECRET` headers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{AccountSnapshot, DeltaPage, LinkMetadata, TransactionSnapshot};

use super::ProviderBackend;

const API_VERSION: &str = "2020-09-14";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider error codes that mean the credential itself is no longer usable
const REJECTED_CODES: &[&str] = &[
    "ITEM_LOGIN_REQUIRED",
    "INVALID_ACCESS_TOKEN",
    "ITEM_NOT_FOUND",
    "ACCESS_NOT_GRANTED",
    "INVALID_CREDENTIALS",
    "ITEM_LOCKED",
    "USER_PERMISSION_REVOKED",
];

/// Reqwest client for the aggregation provider
#[derive(Clone)]
pub struct HttpProvider {
    http_client: Client,
    base_url: String,
    client_id: String,
    secret: String,
}

impl HttpProvider {
    pub fn new(base_url: &str, client_id: &str, secret: &str) -> Result<Self> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Get the base URL (for logging)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Provider request");

        let response = self
            .http_client
            .post(&url)
            .header("PLAID-CLIENT-ID", &self.client_id)
            .header("PLAID-SECRET", &self.secret)
            .header("Plaid-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_failure(status, &body);
            warn!(%url, %status, error = %err, "Provider request failed");
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("{} response interrupted: {}", path, e)))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::InvalidData(format!("Unexpected {} response shape: {}", path, e))
        })
    }

    async fn institution_name(&self, institution_id: &str) -> Result<String> {
        let response: InstitutionResponse = self
            .post(
                "/institutions/get_by_id",
                &InstitutionRequest {
                    institution_id,
                    country_codes: &["US"],
                },
            )
            .await?;
        Ok(response.institution.name)
    }
}

/// Map a non-success response to the provider error taxonomy
fn classify_failure(status: StatusCode, body: &str) -> Error {
    let detail: Option<WireError> = serde_json::from_str(body).ok();
    let (code, message) = match detail {
        Some(ref e) => (
            e.error_code.clone().unwrap_or_default(),
            e.error_message.clone().unwrap_or_default(),
        ),
        None => (String::new(), body.chars().take(200).collect()),
    };
    let summary = if code.is_empty() {
        format!("HTTP {}: {}", status.as_u16(), message)
    } else {
        format!("{} (HTTP {}): {}", code, status.as_u16(), message)
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Error::ProviderUnavailable(summary);
    }

    let error_type = detail.and_then(|e| e.error_type).unwrap_or_default();
    if error_type == "RATE_LIMIT_EXCEEDED" || code == "TRANSACTIONS_SYNC_MUTATION_DURING_PAGINATION"
    {
        return Error::ProviderUnavailable(summary);
    }

    if REJECTED_CODES.contains(&code.as_str()) || error_type == "ITEM_ERROR" {
        return Error::ProviderRejected(format!("{}; reconnect the institution", summary));
    }

    // Remaining 4xx: retrying the same request cannot succeed either
    Error::ProviderRejected(summary)
}

#[async_trait]
impl ProviderBackend for HttpProvider {
    async fn fetch_accounts(&self, credential: &str) -> Result<Vec<AccountSnapshot>> {
        let response: AccountsResponse = self
            .post(
                "/accounts/get",
                &AccessRequest {
                    access_token: credential,
                },
            )
            .await?;

        Ok(response
            .accounts
            .into_iter()
            .map(WireAccount::into_snapshot)
            .collect())
    }

    async fn fetch_transaction_delta(
        &self,
        credential: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<DeltaPage> {
        let response: SyncResponse = self
            .post(
                "/transactions/sync",
                &SyncRequest {
                    access_token: credential,
                    cursor,
                    count,
                },
            )
            .await?;

        Ok(DeltaPage {
            added: decode_transactions(response.added)?,
            modified: decode_transactions(response.modified)?,
            removed: response
                .removed
                .into_iter()
                .map(|r| r.transaction_id)
                .collect(),
            next_cursor: response.next_cursor,
            has_more: response.has_more,
        })
    }

    async fn fetch_link_metadata(&self, credential: &str) -> Result<LinkMetadata> {
        let response: ItemResponse = self
            .post(
                "/item/get",
                &AccessRequest {
                    access_token: credential,
                },
            )
            .await?;

        let institution_id = response.item.institution_id;
        let institution_name = match institution_id.as_deref() {
            Some(id) => match self.institution_name(id).await {
                Ok(name) => Some(name),
                Err(e) => {
                    // Fall back to the id so the link still has a label
                    warn!(institution_id = id, error = %e, "Institution lookup failed");
                    Some(id.to_string())
                }
            },
            None => None,
        };

        Ok(LinkMetadata {
            institution_id,
            institution_name,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn decode_transactions(values: Vec<serde_json::Value>) -> Result<Vec<TransactionSnapshot>> {
    values
        .into_iter()
        .map(|raw| {
            let wire: WireTransaction = serde_json::from_value(raw.clone())
                .map_err(|e| Error::InvalidData(format!("Malformed transaction: {}", e)))?;
            Ok(wire.into_snapshot(raw))
        })
        .collect()
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct AccessRequest<'a> {
    access_token: &'a str,
}

#[derive(Debug, Serialize)]
struct SyncRequest<'a> {
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
    count: u32,
}

#[derive(Debug, Serialize)]
struct InstitutionRequest<'a> {
    institution_id: &'a str,
    country_codes: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct WireError {
    error_type: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<WireAccount>,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    account_id: String,
    name: String,
    mask: Option<String>,
    #[serde(rename = "type")]
    account_type: String,
    subtype: Option<String>,
    balances: WireBalances,
}

#[derive(Debug, Default, Deserialize)]
struct WireBalances {
    current: Option<f64>,
    available: Option<f64>,
    iso_currency_code: Option<String>,
    unofficial_currency_code: Option<String>,
}

impl WireAccount {
    fn into_snapshot(self) -> AccountSnapshot {
        AccountSnapshot {
            account_id: self.account_id,
            name: self.name,
            mask: self.mask,
            account_type: self.account_type,
            subtype: self.subtype,
            current_balance: self.balances.current,
            available_balance: self.balances.available,
            iso_currency_code: self.balances.iso_currency_code,
            unofficial_currency_code: self.balances.unofficial_currency_code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    #[serde(default)]
    added: Vec<serde_json::Value>,
    #[serde(default)]
    modified: Vec<serde_json::Value>,
    #[serde(default)]
    removed: Vec<WireRemoved>,
    next_cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireRemoved {
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    transaction_id: String,
    account_id: String,
    amount: f64,
    date: NaiveDate,
    authorized_date: Option<NaiveDate>,
    #[serde(default)]
    pending: bool,
    pending_transaction_id: Option<String>,
    payment_channel: Option<String>,
    name: String,
    merchant_name: Option<String>,
    personal_finance_category: Option<WireCategory>,
    iso_currency_code: Option<String>,
    unofficial_currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    primary: Option<String>,
    detailed: Option<String>,
}

impl WireTransaction {
    fn into_snapshot(self, raw: serde_json::Value) -> TransactionSnapshot {
        let (primary_category, detailed_category) = match self.personal_finance_category {
            Some(c) => (c.primary, c.detailed),
            None => (None, None),
        };

        TransactionSnapshot {
            transaction_id: self.transaction_id,
            account_id: self.account_id,
            amount: self.amount,
            date: self.date,
            authorized_date: self.authorized_date,
            pending: self.pending,
            pending_transaction_id: self.pending_transaction_id,
            payment_channel: self.payment_channel,
            name: self.name,
            merchant_name: self.merchant_name,
            primary_category,
            detailed_category,
            iso_currency_code: self.iso_currency_code,
            unofficial_currency_code: self.unofficial_currency_code,
            raw,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    item: WireItem,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    institution_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstitutionResponse {
    institution: WireInstitution,
}

#[derive(Debug, Deserialize)]
struct WireInstitution {
    name: String,
}
