//! Aggregation provider abstraction
//!
//! # Architecture
//!
//! - `ProviderBackend` trait: the three calls the reconciler needs
//! - `ProviderClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `HttpProvider` (Plaid-shaped JSON API), `ScriptedProvider`
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = LedgerConfig::load()?;
//! let provider = ProviderClient::from_config(&config.provider)?;
//! let page = provider.fetch_transaction_delta(&credential, None, 100).await?;
//! ```
//!
//! # Errors
//!
//! Every backend reports failures as either `Error::ProviderUnavailable`
//! (transient: network, 5xx, rate limiting) or `Error::ProviderRejected`
//! (the credential is no longer accepted and the user must reconnect).

mod http;
mod scripted;

pub use http::HttpProvider;
pub use scripted::{LinkScript, ScriptedFailure, ScriptedProvider};

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::models::{AccountSnapshot, DeltaPage, LinkMetadata};

/// Trait defining the interface for all provider backends
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Current snapshot of every account behind the credential
    async fn fetch_accounts(&self, credential: &str) -> Result<Vec<AccountSnapshot>>;

    /// Next page of transaction changes after `cursor` (`None` = from the beginning)
    async fn fetch_transaction_delta(
        &self,
        credential: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<DeltaPage>;

    /// Institution details for the link behind the credential
    async fn fetch_link_metadata(&self, credential: &str) -> Result<LinkMetadata>;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Concrete provider client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum ProviderClient {
    /// Plaid-shaped HTTP API
    Http(HttpProvider),
    /// Replays scripted pages (tests and demo data)
    Scripted(ScriptedProvider),
}

impl ProviderClient {
    /// Create an HTTP client from configuration
    ///
    /// Client id and secret are both required.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client_id = config.client_id.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Provider client id missing (set {})",
                crate::config::PROVIDER_CLIENT_ID_VAR
            ))
        })?;
        let secret = config.secret.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Provider secret missing (set {})",
                crate::config::PROVIDER_SECRET_VAR
            ))
        })?;

        Ok(ProviderClient::Http(HttpProvider::new(
            &config.resolved_base_url(),
            client_id,
            secret,
        )?))
    }
}

// Delegate to the inner backend
#[async_trait]
impl ProviderBackend for ProviderClient {
    async fn fetch_accounts(&self, credential: &str) -> Result<Vec<AccountSnapshot>> {
        match self {
            ProviderClient::Http(b) => b.fetch_accounts(credential).await,
            ProviderClient::Scripted(b) => b.fetch_accounts(credential).await,
        }
    }

    async fn fetch_transaction_delta(
        &self,
        credential: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<DeltaPage> {
        match self {
            ProviderClient::Http(b) => b.fetch_transaction_delta(credential, cursor, count).await,
            ProviderClient::Scripted(b) => {
                b.fetch_transaction_delta(credential, cursor, count).await
            }
        }
    }

    async fn fetch_link_metadata(&self, credential: &str) -> Result<LinkMetadata> {
        match self {
            ProviderClient::Http(b) => b.fetch_link_metadata(credential).await,
            ProviderClient::Scripted(b) => b.fetch_link_metadata(credential).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            ProviderClient::Http(b) => b.name(),
            ProviderClient::Scripted(b) => b.name(),
        }
    }
}
