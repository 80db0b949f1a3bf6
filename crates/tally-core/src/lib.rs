//! Tally Core Library
//!
//! Shared functionality for the Tally bookkeeping tool:
//! - Database access and migrations (records, categories, wallets, sessions)
//! - Money handling with exact decimal amounts
//! - Aggregation engine for totals, category and period breakdowns
//! - Pluggable chat-completion backends (OpenAI-compatible, mock)
//! - Normalizer that turns model replies into validated ledger drafts
//! - Prompt library for customizable AI prompts

pub mod ai;
pub mod db;
pub mod error;
pub mod models;
pub mod money;
pub mod prompts;
pub mod stats;

/// Test utilities including a mock chat-completions server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    analyze_records, normalize, AIBackend, AIClient, Analysis, AnalysisReport, AnalysisStats,
    DateRange, Draft, MockBackend, NormalizeContext, NormalizeError, Normalized,
    OpenAICompatibleBackend,
};
pub use db::{Database, RecordFilter, SessionLookup, WalletDeletion};
pub use error::{Error, Result};
pub use models::{
    Category, EntryKind, NewRecord, NewWallet, Record, RecordUpdate, Session, Wallet,
    WalletBalance, WalletKind, WalletUpdate,
};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use stats::{summarize, Granularity, StatsOptions, Summary};
