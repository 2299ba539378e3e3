//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init) and shared utilities (open_db, load_config)
//! - `demo` - Demo data seeding
//! - `links` - Link registration and listing
//! - `status` - Status/dashboard/accounts/insights commands
//! - `subscriptions` - Recurring-charge listing and cancellation simulation
//! - `sync` - Provider sync
//! - `transactions` - Paginated transaction listing

pub mod core;
pub mod demo;
pub mod links;
pub mod status;
pub mod subscriptions;
pub mod sync;
pub mod transactions;

// Re-export command functions for main.rs
pub use core::*;
pub use demo::*;
pub use links::*;
pub use status::*;
pub use subscriptions::*;
pub use sync::*;
pub use transactions::*;

use anyhow::Result;
use serde::Serialize;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format a currency amount, with the sign in front of the symbol
pub fn money(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}
