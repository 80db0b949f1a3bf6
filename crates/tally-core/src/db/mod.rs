//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `records` - Ledger entry CRUD and filtered listing
//! - `categories` - Category listing and on-demand creation
//! - `wallets` - Wallet CRUD with derived balances
//! - `sessions` - Login sessions with lazy expiry

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{Error, Result};
use crate::money::to_minor_units;

mod categories;
mod record_filter;
mod records;
mod sessions;
mod wallets;

pub use record_filter::{FilterResult, RecordFilter};
pub use sessions::SessionLookup;
pub use wallets::WalletDeletion;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// SQLite's `CURRENT_TIMESTAMP` layout
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Categories present in every fresh database: (name, type, icon, color)
const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("餐饮", "expense", "🍜", "#E67E22"),
    ("交通", "expense", "🚗", "#3498DB"),
    ("购物", "expense", "🛍️", "#E91E63"),
    ("居住", "expense", "🏠", "#8E44AD"),
    ("娱乐", "expense", "🎮", "#F1C40F"),
    ("医疗", "expense", "💊", "#E74C3C"),
    ("教育", "expense", "📚", "#16A085"),
    ("其他", "expense", "📌", "#808080"),
    ("工资", "income", "💰", "#2ECC71"),
    ("奖金", "income", "🎁", "#27AE60"),
    ("投资", "income", "📈", "#1ABC9C"),
    ("其他", "income", "📌", "#808080"),
];

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Amount as stored cents, rejecting values that do not fit
pub(crate) fn cents(amount: Decimal) -> Result<i64> {
    to_minor_units(amount).map_err(|e| Error::InvalidData(format!("amount: {}", e)))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block writers
            PRAGMA journal_mode = WAL;

            -- Cache size: ~8MB (2000 pages * 4KB default page size)
            PRAGMA cache_size = 2000;

            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Wallets (cards, cash, funds, e-wallets)
            CREATE TABLE IF NOT EXISTS wallets (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('debit_card', 'credit_card', 'cash', 'fund', 'e_wallet')),
                balance INTEGER NOT NULL DEFAULT 0,        -- starting balance in cents
                credit_limit INTEGER NOT NULL DEFAULT 0,   -- cents, credit cards only
                is_default INTEGER NOT NULL DEFAULT 0,
                icon TEXT NOT NULL,
                color TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Ledger entries
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                amount INTEGER NOT NULL CHECK (amount >= 0),   -- cents
                category TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL,                            -- YYYY-MM-DD
                wallet_id INTEGER REFERENCES wallets(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_records_date ON records(date);
            CREATE INDEX IF NOT EXISTS idx_records_type ON records(type);
            CREATE INDEX IF NOT EXISTS idx_records_category ON records(category);
            CREATE INDEX IF NOT EXISTS idx_records_wallet ON records(wallet_id);

            -- Categories, keyed by name within a type
            CREATE TABLE IF NOT EXISTS categories (
                name TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                icon TEXT NOT NULL DEFAULT '📌',
                color TEXT NOT NULL DEFAULT '#808080',
                PRIMARY KEY (name, type)
            );

            -- Login sessions
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                expires_at DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_username ON sessions(username);
            "#,
        )?;

        self.seed_categories(&conn)?;

        info!("Database schema initialized");
        Ok(())
    }

    fn seed_categories(&self, conn: &DbConn) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO categories (name, type, icon, color) VALUES (?, ?, ?, ?)",
        )?;
        for (name, kind, icon, color) in DEFAULT_CATEGORIES {
            stmt.execute(rusqlite::params![name, kind, icon, color])?;
        }
        Ok(())
    }
}
