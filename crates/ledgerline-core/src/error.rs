//! Error types for Ledgerline

use thiserror::Error;

use crate::models::SyncStats;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The link's stored secret could not be turned into a usable credential
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Transient provider failure (network, 5xx, rate limit)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider refused the credential; the user has to reconnect the institution
    #[error("Provider rejected credential (reconnect required): {0}")]
    ProviderRejected(String),

    #[error("Inconsistent reference: {0}")]
    InconsistentReference(String),

    /// Sync aborted part-way. `stats` counts what was committed before the failure.
    #[error("Sync failed for link {link_id}: {source}")]
    SyncFailed {
        link_id: i64,
        stats: SyncStats,
        #[source]
        source: Box<Error>,
    },

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Whether a caller may retry the failed operation with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ProviderUnavailable(_) | Error::Timeout(_) => true,
            Error::SyncFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Short machine-readable kind, used in batch sync reports and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) | Error::Pool(_) => "database",
            Error::Encryption(_) => "encryption",
            Error::Io(_) => "io",
            Error::Http(_) => "http",
            Error::Json(_) => "json",
            Error::Config(_) => "config",
            Error::InvalidData(_) => "invalid_data",
            Error::NotFound(_) => "not_found",
            Error::CredentialUnavailable(_) => "credential_unavailable",
            Error::ProviderUnavailable(_) => "provider_unavailable",
            Error::ProviderRejected(_) => "provider_rejected",
            Error::InconsistentReference(_) => "inconsistent_reference",
            Error::SyncFailed { source, .. } => source.kind(),
            Error::Timeout(_) => "timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
