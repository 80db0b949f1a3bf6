//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether a ledger entry brings money in or takes it out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Chinese label used in prompts and narrative summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Income => "收入",
            Self::Expense => "支出",
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    /// Exact match only: "Income" or " expense" are rejected.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown entry type: {}", s)),
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub wallet_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new ledger entry to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub wallet_id: Option<i64>,
}

/// Partial update of a ledger entry
///
/// `None` keeps the stored value. `wallet_id: Some(None)` detaches the
/// entry from its wallet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub kind: Option<EntryKind>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub wallet_id: Option<Option<i64>>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.date.is_none()
            && self.wallet_id.is_none()
    }
}

/// Default category icon
pub const DEFAULT_CATEGORY_ICON: &str = "📌";
/// Default category color
pub const DEFAULT_CATEGORY_COLOR: &str = "#808080";

/// A category, keyed by name and entry type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub icon: String,
    pub color: String,
}

impl Category {
    /// Category with the default icon and color
    pub fn new(name: &str, kind: EntryKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            icon: DEFAULT_CATEGORY_ICON.to_string(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
        }
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = icon.to_string();
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }
}

/// Wallet types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    DebitCard,
    CreditCard,
    Cash,
    Fund,
    EWallet,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DebitCard => "debit_card",
            Self::CreditCard => "credit_card",
            Self::Cash => "cash",
            Self::Fund => "fund",
            Self::EWallet => "e_wallet",
        }
    }

    pub fn default_icon(&self) -> &'static str {
        match self {
            Self::DebitCard => "💳",
            Self::CreditCard => "🏦",
            Self::Cash => "💵",
            Self::Fund => "📈",
            Self::EWallet => "📱",
        }
    }

    pub fn default_color(&self) -> &'static str {
        match self {
            Self::DebitCard => "#3498DB",
            Self::CreditCard => "#9B59B6",
            Self::Cash => "#2ECC71",
            Self::Fund => "#E74C3C",
            Self::EWallet => "#1ABC9C",
        }
    }
}

impl std::str::FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "debit_card" => Ok(Self::DebitCard),
            "credit_card" => Ok(Self::CreditCard),
            "cash" => Ok(Self::Cash),
            "fund" => Ok(Self::Fund),
            "e_wallet" => Ok(Self::EWallet),
            _ => Err(format!("Unknown wallet type: {}", s)),
        }
    }
}

impl std::fmt::Display for WalletKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A wallet (card, cash, fund, e-wallet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WalletKind,
    /// Starting balance
    pub balance: Decimal,
    /// Only meaningful for credit cards
    pub credit_limit: Decimal,
    pub is_default: bool,
    pub icon: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new wallet to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewWallet {
    pub name: String,
    pub kind: WalletKind,
    pub balance: Decimal,
    pub credit_limit: Decimal,
    pub is_default: bool,
    /// Falls back to the kind's default icon
    pub icon: Option<String>,
    /// Falls back to the kind's default color
    pub color: Option<String>,
}

impl NewWallet {
    pub fn new(name: &str, kind: WalletKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            balance: Decimal::ZERO,
            credit_limit: Decimal::ZERO,
            is_default: false,
            icon: None,
            color: None,
        }
    }
}

/// Partial update of a wallet
///
/// `is_default`: `Some(true)` makes this the only default wallet,
/// `Some(false)` clears the flag, `None` keeps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletUpdate {
    pub name: Option<String>,
    pub kind: Option<WalletKind>,
    pub balance: Option<Decimal>,
    pub credit_limit: Option<Decimal>,
    pub is_default: Option<bool>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// A wallet with totals derived from the records that reference it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletBalance {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub available: Decimal,
}

impl WalletBalance {
    /// Derive `available` from the wallet and its record totals
    ///
    /// Credit cards: remaining credit, `limit - (expense - income)`.
    /// Everything else: `balance + income - expense`.
    pub fn from_totals(wallet: Wallet, total_income: Decimal, total_expense: Decimal) -> Self {
        let available = match wallet.kind {
            WalletKind::CreditCard => wallet.credit_limit - (total_expense - total_income),
            _ => wallet.balance + total_income - total_expense,
        };
        Self {
            wallet,
            total_income,
            total_expense,
            available,
        }
    }
}

/// A login session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
