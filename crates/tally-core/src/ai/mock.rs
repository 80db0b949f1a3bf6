//! Mock backend for testing
//!
//! Provides configurable mock replies for all AI operations.
//! Useful for unit tests and offline demos without an API key.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::{Category, EntryKind};

use super::AIBackend;

/// Words that mark a parsed line as income
const INCOME_WORDS: &[&str] = &["工资", "收入", "奖金", "薪水", "报销", "红包", "salary", "income"];

/// Category used when nothing better matches
const FALLBACK_CATEGORY: &str = "其他";

/// Mock AI backend for testing
///
/// Returns predictable replies for all AI operations.
/// Can be configured with scripted replies for specific tests.
#[derive(Clone, Debug)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    parse_reply: Option<String>,
    receipt_reply: Option<String>,
    analysis_reply: Option<String>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            parse_reply: None,
            receipt_reply: None,
            analysis_reply: None,
        }
    }

    /// Create an unhealthy mock backend; every call fails
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Reply to `parse_text` with this exact text
    pub fn with_parse_reply(mut self, reply: &str) -> Self {
        self.parse_reply = Some(reply.to_string());
        self
    }

    /// Reply to `parse_receipt` with this exact text
    pub fn with_receipt_reply(mut self, reply: &str) -> Self {
        self.receipt_reply = Some(reply.to_string());
        self
    }

    /// Reply to `analyze` with this exact text
    pub fn with_analysis_reply(mut self, reply: &str) -> Self {
        self.analysis_reply = Some(reply.to_string());
        self
    }

    fn ensure_healthy(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(Error::Upstream("mock backend is unavailable".into()))
        }
    }
}

/// Guess a single draft from free text
///
/// The first number is the amount. Income words flip the kind. The category
/// is any known name mentioned in the text, else the first of the right kind.
fn guess_draft(text: &str, categories: &[Category], today: NaiveDate) -> String {
    let Some(amount) = first_number(text) else {
        return json!({"error": "无法解析"}).to_string();
    };

    let lower = text.to_lowercase();
    let kind = if INCOME_WORDS.iter().any(|w| lower.contains(w)) {
        EntryKind::Income
    } else {
        EntryKind::Expense
    };

    let category = categories
        .iter()
        .filter(|c| c.kind == kind)
        .find(|c| text.contains(c.name.as_str()))
        .or_else(|| categories.iter().find(|c| c.kind == kind))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

    json!([{
        "type": kind.as_str(),
        "amount": amount,
        "category": category,
        "description": text.trim(),
        "date": today.format("%Y-%m-%d").to_string(),
    }])
    .to_string()
}

/// First run of digits (with at most one decimal point) in the text
fn first_number(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut seen_dot = false;
    let end = text[start..]
        .char_indices()
        .find(|&(_, c)| {
            if c == '.' && !seen_dot {
                seen_dot = true;
                false
            } else {
                !c.is_ascii_digit()
            }
        })
        .map(|(i, _)| start + i)
        .unwrap_or(text.len());
    Some(text[start..end].trim_end_matches('.').to_string())
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn parse_text(
        &self,
        text: &str,
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<String> {
        self.ensure_healthy()?;
        Ok(self
            .parse_reply
            .clone()
            .unwrap_or_else(|| guess_draft(text, categories, today)))
    }

    async fn parse_receipt(
        &self,
        _image: &str,
        _categories: &[Category],
        today: NaiveDate,
    ) -> Result<String> {
        self.ensure_healthy()?;
        Ok(self.receipt_reply.clone().unwrap_or_else(|| {
            json!({
                "type": "expense",
                "amount": 36.8,
                "category": "购物",
                "description": "模拟超市",
                "date": today.format("%Y-%m-%d").to_string(),
                "items": ["牛奶", "面包"],
            })
            .to_string()
        }))
    }

    async fn analyze(&self, _data_summary: &str) -> Result<String> {
        self.ensure_healthy()?;
        Ok(self.analysis_reply.clone().unwrap_or_else(|| {
            json!({
                "analysis": "收支整体平衡，支出集中在日常消费。",
                "suggestions": ["为大额支出设定月度预算", "每月固定存下一部分收入"],
                "highlights": ["收入稳定"],
                "healthScore": 75,
            })
            .to_string()
        }))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
