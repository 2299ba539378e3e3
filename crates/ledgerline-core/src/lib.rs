//! Ledgerline Core Library
//!
//! Shared functionality for the Ledgerline personal finance engine:
//! - Ledger store (links, accounts, transactions) with encrypted SQLite
//! - Aggregation provider client (Plaid-shaped HTTP API, scripted fake)
//! - Cursor-based incremental sync with per-page atomic commits
//! - Recurring-charge detection and cancellation simulation
//! - Dashboard aggregation and rule-based insight cards
//! - Deterministic demo data

pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod dates;
pub mod db;
pub mod demo;
pub mod detect;
pub mod error;
pub mod insights;
pub mod math;
pub mod models;
pub mod provider;
pub mod sync;

/// Test utilities including mock aggregation provider server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{LedgerConfig, ProviderConfig, ProviderEnvironment, SyncConfig};
pub use credentials::{CredentialResolver, StoredCredentials};
pub use dashboard::{DashboardEngine, DashboardInputs};
pub use db::{Database, TransactionFilter};
pub use demo::{seed_demo_data, DemoSeed};
pub use detect::{
    normalize_merchant_key, simulate_cancellation, subscription_totals, DetectionConfig,
    SubscriptionDetector,
};
pub use error::{Error, Result};
pub use insights::{InsightCard, InsightEngine, InsightSeverity};
pub use models::*;
pub use provider::{
    HttpProvider, LinkScript, ProviderBackend, ProviderClient, ScriptedFailure, ScriptedProvider,
};
pub use sync::Reconciler;
