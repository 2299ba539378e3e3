//! Ledgerline CLI - Local ledger sync and recurring-charge detection
//!
//! Usage:
//!   ledgerline init                       Initialize database
//!   ledgerline link add --external-id ... Register a provider link
//!   ledgerline sync                       Sync every link of the user
//!   ledgerline dashboard                  Show net worth and cash flow

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let user = cli.user.as_str();
    let json = cli.json;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, cli.config.as_deref(), user, cli.no_encrypt),
        Commands::Link { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                LinkAction::Add {
                    external_id,
                    access_token,
                    institution_id,
                    institution_name,
                } => commands::cmd_link_add(
                    &db,
                    user,
                    &external_id,
                    &access_token,
                    institution_id.as_deref(),
                    institution_name.as_deref(),
                    json,
                ),
            }
        }
        Commands::Links => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_links(&db, user, json)
        }
        Commands::Sync { link } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_sync(&db, &config, user, link, json).await
        }
        Commands::Accounts => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_accounts(&db, user, json)
        }
        Commands::Transactions {
            account,
            category,
            from,
            to,
            page,
            page_size,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let query = commands::TransactionQuery {
                account,
                category,
                from,
                to,
                page,
                page_size,
            };
            commands::cmd_transactions(&db, user, &query, json)
        }
        Commands::Subscriptions => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_subscriptions(&db, &config, user, json)
        }
        Commands::SimulateCancel { merchants } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_simulate_cancel(&db, &config, user, &merchants, json)
        }
        Commands::Dashboard => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_dashboard(&db, &config, user, json)
        }
        Commands::Insights => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_insights(&db, &config, user, json)
        }
        Commands::Demo => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_demo(&db, user, json).await
        }
    }
}
