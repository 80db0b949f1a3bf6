//! Wallet command implementations

use anyhow::{Context, Result};
use tally_core::money::format_money;
use tally_core::{Database, NewWallet, WalletDeletion, WalletKind};
use tracing::info;

use super::{parse_money, truncate};

pub fn cmd_wallets_list(db: &Database) -> Result<()> {
    let wallets = db.list_wallets()?;

    if wallets.is_empty() {
        println!("No wallets yet. Add one with:");
        println!("  tally wallets add 招商银行 -t debit_card --balance 5000");
        return Ok(());
    }

    println!();
    println!("👛 Wallets");
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in wallets {
        let wallet = &entry.wallet;
        let marker = if wallet.is_default { "★" } else { " " };
        let limit = if wallet.kind == WalletKind::CreditCard {
            format!(" (limit {})", format_money(wallet.credit_limit))
        } else {
            String::new()
        };

        println!(
            "   {}[{}] {} {:<16} {:<12} │ available {:>12}{}",
            marker,
            wallet.id,
            wallet.icon,
            truncate(&wallet.name, 16),
            wallet.kind,
            format_money(entry.available),
            limit
        );
    }

    Ok(())
}

pub fn cmd_wallets_add(
    db: &Database,
    name: &str,
    kind: &str,
    balance: Option<&str>,
    credit_limit: Option<&str>,
    is_default: bool,
) -> Result<i64> {
    let kind: WalletKind = kind
        .trim()
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let mut wallet = NewWallet::new(name.trim(), kind);
    if let Some(balance) = balance {
        wallet.balance = parse_money(balance)?;
    }
    if let Some(limit) = credit_limit {
        wallet.credit_limit = parse_money(limit)?;
    }
    wallet.is_default = is_default;

    let id = db.create_wallet(&wallet).context("Failed to add wallet")?;

    info!(id, kind = %kind, "Added wallet");
    println!("✅ Added wallet {}: {}", id, wallet.name);

    Ok(id)
}

pub fn cmd_wallets_delete(db: &Database, id: i64) -> Result<()> {
    match db.delete_wallet(id)? {
        WalletDeletion::Deleted => {
            println!("🗑️  Deleted wallet {}", id);
            Ok(())
        }
        WalletDeletion::NotFound => anyhow::bail!("Wallet {} not found", id),
        WalletDeletion::InUse(count) => anyhow::bail!(
            "Wallet {} has {} linked records and cannot be deleted",
            id,
            count
        ),
    }
}
