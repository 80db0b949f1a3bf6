//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Bookkeeping with natural-language entry
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Self-hosted personal bookkeeping with AI-assisted entry", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default every API call needs a session from /api/auth/login.
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Manage records (list, add, delete)
    Records {
        #[command(subcommand)]
        action: Option<RecordsAction>,
    },

    /// Manage categories (list, add)
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Manage wallets (list, add, delete)
    Wallets {
        #[command(subcommand)]
        action: Option<WalletsAction>,
    },

    /// Show income, expense and category statistics
    Stats {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Period grouping: day, week, month, year
        #[arg(short, long, default_value = "month")]
        group_by: String,
    },

    /// AI-assisted entry and analysis
    Ai {
        #[command(subcommand)]
        action: AiAction,
    },

    /// Inspect and customize AI prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum RecordsAction {
    /// List records, newest first
    List {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Only income or expense
        #[arg(short = 't', long = "type")]
        kind: Option<String>,

        /// Only this category
        #[arg(short, long)]
        category: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Add a record
    Add {
        /// income or expense
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Amount (non-negative, e.g. 25.50)
        #[arg(short, long)]
        amount: String,

        /// Category name
        #[arg(short, long)]
        category: String,

        /// Free-text description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Wallet ID
        #[arg(short, long)]
        wallet: Option<i64>,
    },

    /// Delete a record
    Delete {
        /// Record ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List {
        /// Only income or expense
        #[arg(short = 't', long = "type")]
        kind: Option<String>,
    },

    /// Add a category (no-op if it exists)
    Add {
        /// Category name
        name: String,

        /// income or expense
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Icon (emoji)
        #[arg(long)]
        icon: Option<String>,

        /// Color (hex, e.g. "#3498DB")
        #[arg(long)]
        color: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum WalletsAction {
    /// List wallets with balances
    List,

    /// Add a wallet
    Add {
        /// Wallet name
        name: String,

        /// debit_card, credit_card, cash, fund, e_wallet
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Starting balance
        #[arg(long)]
        balance: Option<String>,

        /// Credit limit (credit cards)
        #[arg(long)]
        credit_limit: Option<String>,

        /// Make this the default wallet
        #[arg(long)]
        default: bool,
    },

    /// Delete a wallet no record references
    Delete {
        /// Wallet ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum AiAction {
    /// Parse free text into draft records
    Parse {
        /// Text to parse, e.g. "午饭 25，打车 18"
        text: String,

        /// Store the drafts as records
        #[arg(long)]
        save: bool,

        /// Wallet ID for saved records
        #[arg(short, long)]
        wallet: Option<i64>,
    },

    /// Run the normalizer on a raw model reply (file or stdin)
    Normalize {
        /// File holding the raw reply (reads stdin if omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Require exactly one record, as receipt OCR does
        #[arg(long)]
        single: bool,
    },

    /// Read a receipt image into a draft record
    Ocr {
        /// Image file (JPEG, PNG, WebP)
        image: PathBuf,

        /// Store the draft as a record
        #[arg(long)]
        save: bool,

        /// Wallet ID for the saved record
        #[arg(short, long)]
        wallet: Option<i64>,
    },

    /// Narrative analysis of income and spending
    Analyze {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Only income or expense
        #[arg(short = 't', long = "type")]
        kind: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List prompts with the commands that use them
    List,

    /// Print a prompt as it will be sent
    Show {
        /// Prompt ID (parse_text, parse_receipt, analyze_finances)
        id: String,

        /// Only the system or user section
        #[arg(long)]
        section: Option<String>,
    },

    /// Show the override directory and which overrides exist
    Path,

    /// Copy the built-in prompts into the override directory for editing
    Init {
        /// Only this prompt
        id: Option<String>,

        /// Directory to write to (defaults to the override directory)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Overwrite existing override files
        #[arg(long)]
        force: bool,
    },
}
