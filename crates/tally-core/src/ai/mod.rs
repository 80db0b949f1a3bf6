//! Chat-completion backend abstraction
//!
//! This module provides a backend-agnostic interface for the three model
//! calls the tracker makes: parsing free text into ledger drafts, reading a
//! receipt image, and writing a narrative analysis of the statistics.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all model calls
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//! - `extract`: finds the message text in a provider's response body
//! - `normalize`: turns raw model text into validated drafts
//! - `analysis`: prompt input and reply handling for narrative analysis
//!
//! Backends return the model's raw text. Callers decide what it means by
//! running it through [`normalize::normalize`] or [`analysis::parse_analysis`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let ai = AIClient::from_env();
//!
//! if let Some(ref client) = ai {
//!     let raw = client.parse_text("午饭 25", &categories, today).await?;
//!     let drafts = normalize(&raw, &NormalizeContext::multiple(today))?;
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai, mock). Default: openai
//! - `AI_API_BASE`: API base URL (default: https://api.openai.com/v1)
//! - `AI_API_KEY`: Bearer token
//! - `AI_MODEL`: Text model (default: gpt-4o-mini)
//! - `AI_VISION_MODEL`: Receipt model (default: `AI_MODEL`, then gpt-4o)
//! - `AI_TIMEOUT_SECS`: Request timeout (default: 60)

pub mod analysis;
pub mod extract;
mod mock;
pub mod normalize;
mod openai_compatible;

pub use analysis::{
    analyze_records, Analysis, AnalysisReport, AnalysisStats, DateRange, MonthTotals,
};
pub use extract::extract_content;
pub use mock::MockBackend;
pub use normalize::{normalize, Draft, NormalizeContext, NormalizeError, Normalized};
pub use openai_compatible::OpenAICompatibleBackend;

use async_trait::async_trait;
use base64::Engine;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::Category;

/// Trait defining the interface for all AI backends
///
/// Every call returns the model's raw message text.
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Ask for ledger drafts describing `text`
    async fn parse_text(
        &self,
        text: &str,
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<String>;

    /// Ask for a ledger draft read off a receipt image
    ///
    /// `image` is a `data:` URL or bare base64 (treated as JPEG).
    async fn parse_receipt(
        &self,
        image: &str,
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<String>;

    /// Ask for a narrative analysis of a rendered statistics summary
    async fn analyze(&self, data_summary: &str) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
/// All variants implement the same AIBackend operations.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible chat completions (OpenAI, DeepSeek, vLLM, LocalAI, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing and offline demos
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `openai` (default): Uses `AI_API_BASE`, `AI_API_KEY`, `AI_MODEL`
    /// - `mock`: Creates a mock backend with canned replies
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "openai".to_string());

        match backend.to_lowercase().as_str() {
            "openai" | "openai_compatible" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to openai");
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Short backend name for status output
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::OpenAICompatible(_) => "openai",
            AIClient::Mock(_) => "mock",
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn parse_text(
        &self,
        text: &str,
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.parse_text(text, categories, today).await,
            AIClient::Mock(b) => b.parse_text(text, categories, today).await,
        }
    }

    async fn parse_receipt(
        &self,
        image: &str,
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.parse_receipt(image, categories, today).await,
            AIClient::Mock(b) => b.parse_receipt(image, categories, today).await,
        }
    }

    async fn analyze(&self, data_summary: &str) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.analyze(data_summary).await,
            AIClient::Mock(b) => b.analyze(data_summary).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Render categories for a prompt as `name(type)` pairs
pub fn category_list(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| format!("{}({})", c.name, c.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Image reference for a vision request
///
/// `data:` URLs pass through; anything else is taken as base64 JPEG.
pub fn image_data_url(image: &str) -> String {
    let image = image.trim();
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:image/jpeg;base64,{}", image)
    }
}

/// Encode raw image bytes as a `data:` URL
pub fn encode_image(bytes: &[u8], mime: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", mime, encoded)
}
