//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Ledgerline - Sync your bank ledger and find recurring charges
#[derive(Parser)]
#[command(name = "ledgerline")]
#[command(about = "Local ledger sync, subscription detection and cash-flow dashboard", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "ledgerline.db", global = true)]
    pub db: PathBuf,

    /// User whose ledger to operate on
    #[arg(long, default_value = "local", global = true)]
    pub user: String,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set LEDGERLINE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database, encryption and provider status
    Status,

    /// Manage provider links
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// List links with their sync state
    Links,

    /// Sync transactions from the aggregation provider
    Sync {
        /// Only sync this link (defaults to every link of the user)
        #[arg(short, long)]
        link: Option<i64>,
    },

    /// List accounts
    Accounts,

    /// List transactions, newest first
    Transactions {
        /// Filter by account id
        #[arg(short, long)]
        account: Option<i64>,

        /// Filter by primary category (case-insensitive)
        #[arg(short, long)]
        category: Option<String>,

        /// Earliest date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: i64,

        /// Transactions per page
        #[arg(long, default_value = "25")]
        page_size: i64,
    },

    /// Show detected recurring charges
    Subscriptions,

    /// Estimate savings from cancelling subscriptions
    SimulateCancel {
        /// Merchant names (case and punctuation are ignored)
        #[arg(required = true)]
        merchants: Vec<String>,
    },

    /// Show the dashboard summary
    Dashboard,

    /// Show insight cards
    Insights,

    /// Seed demo data for the user
    Demo,
}

#[derive(Subcommand)]
pub enum LinkAction {
    /// Register a link obtained from the provider's link flow
    Add {
        /// Provider item id
        #[arg(long)]
        external_id: String,

        /// Provider access token
        #[arg(long)]
        access_token: String,

        /// Institution id
        #[arg(long)]
        institution_id: Option<String>,

        /// Institution display name
        #[arg(long)]
        institution_name: Option<String>,
    },
}
