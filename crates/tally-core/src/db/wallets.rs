//! Wallet operations

use rusqlite::{params, Row};

use super::{cents, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewWallet, Wallet, WalletBalance, WalletUpdate};
use crate::money::from_minor_units;

/// Wallet columns plus income/expense sums over the records that reference it
const WALLET_BALANCE_QUERY: &str = r#"
    SELECT w.id, w.name, w.type, w.balance, w.credit_limit, w.is_default,
           w.icon, w.color, w.created_at, w.updated_at,
           COALESCE(SUM(CASE WHEN r.type = 'income' THEN r.amount ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN r.type = 'expense' THEN r.amount ELSE 0 END), 0)
    FROM wallets w
    LEFT JOIN records r ON r.wallet_id = w.id
"#;

/// Outcome of a wallet delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletDeletion {
    Deleted,
    NotFound,
    /// Records still reference the wallet
    InUse(i64),
}

fn row_to_wallet_balance(row: &Row) -> rusqlite::Result<WalletBalance> {
    let kind_str: String = row.get(2)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    let wallet = Wallet {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        balance: from_minor_units(row.get(3)?),
        credit_limit: from_minor_units(row.get(4)?),
        is_default: row.get(5)?,
        icon: row.get(6)?,
        color: row.get(7)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    };

    Ok(WalletBalance::from_totals(
        wallet,
        from_minor_units(row.get(10)?),
        from_minor_units(row.get(11)?),
    ))
}

impl Database {
    /// Create a wallet and return its ID
    ///
    /// A new default wallet clears the flag on every other wallet first.
    pub fn create_wallet(&self, wallet: &NewWallet) -> Result<i64> {
        let name = wallet.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("wallet name is empty".into()));
        }

        let conn = self.conn()?;
        if wallet.is_default {
            conn.execute("UPDATE wallets SET is_default = 0", [])?;
        }

        conn.execute(
            "INSERT INTO wallets (name, type, balance, credit_limit, is_default, icon, color) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                name,
                wallet.kind.as_str(),
                cents(wallet.balance)?,
                cents(wallet.credit_limit)?,
                wallet.is_default,
                wallet.icon.as_deref().unwrap_or(wallet.kind.default_icon()),
                wallet.color.as_deref().unwrap_or(wallet.kind.default_color()),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List wallets with derived totals, default first, then in creation order
    pub fn list_wallets(&self) -> Result<Vec<WalletBalance>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} GROUP BY w.id ORDER BY w.is_default DESC, w.created_at ASC, w.id ASC",
            WALLET_BALANCE_QUERY
        ))?;

        let wallets = stmt
            .query_map([], row_to_wallet_balance)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(wallets)
    }

    /// Get a wallet with derived totals
    pub fn get_wallet(&self, id: i64) -> Result<Option<WalletBalance>> {
        let conn = self.conn()?;
        let wallet = conn
            .query_row(
                &format!("{} WHERE w.id = ? GROUP BY w.id", WALLET_BALANCE_QUERY),
                params![id],
                row_to_wallet_balance,
            )
            .ok();

        Ok(wallet)
    }

    /// Apply a partial update; returns None when the wallet does not exist
    ///
    /// `is_default: Some(true)` clears every other default first, `Some(false)`
    /// clears this wallet's flag, `None` leaves it alone.
    pub fn update_wallet(&self, id: i64, update: &WalletUpdate) -> Result<Option<WalletBalance>> {
        if self.get_wallet(id)?.is_none() {
            return Ok(None);
        }

        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::InvalidData("wallet name is empty".into()));
            }
            sets.push("name = ?");
            values.push(Box::new(name.to_string()));
        }
        if let Some(kind) = update.kind {
            sets.push("type = ?");
            values.push(Box::new(kind.as_str()));
        }
        if let Some(balance) = update.balance {
            sets.push("balance = ?");
            values.push(Box::new(cents(balance)?));
        }
        if let Some(credit_limit) = update.credit_limit {
            sets.push("credit_limit = ?");
            values.push(Box::new(cents(credit_limit)?));
        }
        if let Some(is_default) = update.is_default {
            sets.push("is_default = ?");
            values.push(Box::new(is_default));
        }
        if let Some(ref icon) = update.icon {
            sets.push("icon = ?");
            values.push(Box::new(icon.clone()));
        }
        if let Some(ref color) = update.color {
            sets.push("color = ?");
            values.push(Box::new(color.clone()));
        }

        if !sets.is_empty() {
            let conn = self.conn()?;
            if update.is_default == Some(true) {
                conn.execute("UPDATE wallets SET is_default = 0 WHERE id != ?", params![id])?;
            }

            values.push(Box::new(id));
            let sql = format!(
                "UPDATE wallets SET {}, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                sets.join(", ")
            );
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            conn.execute(&sql, params_refs.as_slice())?;
        }

        self.get_wallet(id)
    }

    /// Delete a wallet unless records still reference it
    pub fn delete_wallet(&self, id: i64) -> Result<WalletDeletion> {
        let conn = self.conn()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM wallets WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(WalletDeletion::NotFound);
        }

        let references: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE wallet_id = ?",
            params![id],
            |row| row.get(0),
        )?;
        if references > 0 {
            return Ok(WalletDeletion::InUse(references));
        }

        conn.execute("DELETE FROM wallets WHERE id = ?", params![id])?;
        Ok(WalletDeletion::Deleted)
    }

    /// Fail with `InvalidData` when no wallet has this ID
    pub(crate) fn ensure_wallet_exists(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM wallets WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(Error::InvalidData(format!("wallet {} does not exist", id)))
        }
    }
}
