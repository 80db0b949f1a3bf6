//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `ai` - AI commands (parse, normalize, ocr, analyze)
//! - `categories` - Category commands (list, add)
//! - `core` - Core commands (init) and shared utilities (open_db)
//! - `prompts` - Prompt library management commands
//! - `records` - Record commands (list, add, delete)
//! - `serve` - Web server command
//! - `stats` - Statistics command
//! - `wallets` - Wallet commands (list, add, delete)

pub mod ai;
pub mod categories;
pub mod core;
pub mod prompts;
pub mod records;
pub mod serve;
pub mod stats;
pub mod wallets;

// Re-export command functions for main.rs
pub use ai::*;
pub use categories::*;
pub use core::*;
pub use prompts::*;
pub use records::*;
pub use serve::*;
pub use stats::*;
pub use wallets::*;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_core::EntryKind;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse a YYYY-MM-DD argument
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

pub fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value.map(parse_date).transpose()
}

pub fn parse_kind(value: &str) -> Result<EntryKind> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid type '{}', expected income or expense", value))
}

/// Parse a non-negative amount argument
pub fn parse_money(value: &str) -> Result<Decimal> {
    let amount = tally_core::money::parse_amount(&serde_json::Value::String(value.to_string()))
        .with_context(|| format!("Invalid amount '{}'", value))?;
    Ok(amount)
}

/// Amount colored by direction: red for expenses, green for income
pub fn colored_amount(kind: EntryKind, amount: Decimal) -> String {
    let formatted = tally_core::money::format_money(amount);
    match kind {
        EntryKind::Expense => format!("\x1b[31m-{}\x1b[0m", formatted),
        EntryKind::Income => format!("\x1b[32m+{}\x1b[0m", formatted),
    }
}
