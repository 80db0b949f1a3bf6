//! Normalizing model replies into ledger drafts
//!
//! Models are asked for JSON but answer with whatever they like: fenced
//! blocks, prose around an array, a bare `{"error": ...}` sentinel. This
//! module applies one fixed policy to the raw text and either returns
//! validated drafts or says exactly why it could not.
//!
//! Policy, first match wins:
//! 1. trim
//! 2. strip a leading fence (optionally tagged `json`) and a trailing fence
//! 3. first structural bracket is `[`: parse first `[` .. last `]` as an array
//! 4. first structural bracket is `{`: parse first `{` .. last `}` as one
//!    object; a non-empty `error` field is an upstream failure
//! 5. anything else: no structured data, with a bounded excerpt
//!
//! Steps 3 and 4 search the whole cleaned text, so prose before the first
//! bracket or after the last one is dropped rather than rejected.
//!
//! The output never depends on the clock: a missing `date` takes
//! [`NormalizeContext::today`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{EntryKind, NewRecord};
use crate::money::parse_amount;

/// Maximum characters of raw text carried in diagnostics
pub const EXCERPT_CHARS: usize = 200;

/// A validated ledger entry proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    /// Line items read off a receipt, when the model lists them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl Draft {
    /// Turn an accepted draft into a record to insert
    pub fn into_new_record(self, wallet_id: Option<i64>) -> NewRecord {
        NewRecord {
            kind: self.kind,
            amount: self.amount,
            category: self.category,
            description: self.description,
            date: self.date,
            wallet_id,
        }
    }
}

/// Call-site context for normalization
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext {
    /// Whether more than one draft is acceptable
    pub allow_multiple: bool,
    /// Date used for drafts that omit one
    pub today: NaiveDate,
}

impl NormalizeContext {
    pub fn single(today: NaiveDate) -> Self {
        Self {
            allow_multiple: false,
            today,
        }
    }

    pub fn multiple(today: NaiveDate) -> Self {
        Self {
            allow_multiple: true,
            today,
        }
    }
}

/// Successful normalization
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Single(Draft),
    /// Two or more drafts
    Multiple(Vec<Draft>),
}

impl Normalized {
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(drafts) => drafts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_drafts(self) -> Vec<Draft> {
        match self {
            Self::Single(draft) => vec![draft],
            Self::Multiple(drafts) => drafts,
        }
    }
}

/// Why a model reply could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The model answered with an explicit `{"error": "..."}` sentinel
    #[error("{0}")]
    Upstream(String),

    #[error("no structured data found: {reason}")]
    NoStructuredData { reason: String, excerpt: String },

    #[error("model returned no records")]
    Empty,

    /// `index` is 1-based
    #[error("record {index}: invalid {field}: {reason}")]
    InvalidDraft {
        index: usize,
        field: &'static str,
        reason: String,
        excerpt: String,
    },

    #[error("expected a single record, got {count}")]
    TooManyRecords { count: usize },
}

impl NormalizeError {
    /// Bounded excerpt of the offending text, when there is one
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::NoStructuredData { excerpt, .. } | Self::InvalidDraft { excerpt, .. } => {
                Some(excerpt)
            }
            _ => None,
        }
    }
}

/// Normalize a raw model reply
pub fn normalize(raw: &str, ctx: &NormalizeContext) -> Result<Normalized, NormalizeError> {
    let elements = extract_elements(raw)?;

    if elements.is_empty() {
        return Err(NormalizeError::Empty);
    }
    if !ctx.allow_multiple && elements.len() > 1 {
        return Err(NormalizeError::TooManyRecords {
            count: elements.len(),
        });
    }

    let mut drafts = elements
        .iter()
        .enumerate()
        .map(|(i, element)| validate_draft(i + 1, element, ctx.today))
        .collect::<Result<Vec<_>, _>>()?;

    if drafts.len() == 1 {
        Ok(Normalized::Single(drafts.remove(0)))
    } else {
        Ok(Normalized::Multiple(drafts))
    }
}

/// Truncate to [`EXCERPT_CHARS`] characters on a character boundary
pub fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Steps 1 to 5: find the JSON and split it into elements
fn extract_elements(raw: &str) -> Result<Vec<Value>, NormalizeError> {
    let cleaned = strip_fences(raw.trim());
    let no_data = |reason: String| NormalizeError::NoStructuredData {
        reason,
        excerpt: excerpt(raw.trim()),
    };

    let start = cleaned
        .find(|c: char| c == '[' || c == '{')
        .ok_or_else(|| no_data("no JSON object or array in reply".to_string()))?;

    if cleaned[start..].starts_with('[') {
        let end = cleaned
            .rfind(']')
            .filter(|&end| end > start)
            .ok_or_else(|| no_data("unterminated JSON array".to_string()))?;
        match serde_json::from_str::<Value>(&cleaned[start..=end]) {
            Ok(Value::Array(elements)) => Ok(elements),
            Ok(_) => Err(no_data("expected a JSON array".to_string())),
            Err(e) => Err(no_data(format!("invalid JSON array: {}", e))),
        }
    } else {
        let end = cleaned
            .rfind('}')
            .filter(|&end| end > start)
            .ok_or_else(|| no_data("unterminated JSON object".to_string()))?;
        let object = match serde_json::from_str::<Value>(&cleaned[start..=end]) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return Err(no_data("expected a JSON object".to_string())),
            Err(e) => return Err(no_data(format!("invalid JSON object: {}", e))),
        };
        if let Some(message) = upstream_error(&object) {
            return Err(NormalizeError::Upstream(message));
        }
        Ok(vec![Value::Object(object)])
    }
}

/// Strip a leading and a trailing code fence, independently
fn strip_fences(text: &str) -> &str {
    let mut text = text;
    if let Some(rest) = text.strip_prefix("```") {
        let rest = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text.trim()
}

/// Message of an `{"error": ...}` sentinel, if the object is one
fn upstream_error(object: &Map<String, Value>) -> Option<String> {
    match object.get("error")? {
        Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
        Value::Null | Value::Bool(false) | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn validate_draft(index: usize, element: &Value, today: NaiveDate) -> Result<Draft, NormalizeError> {
    let invalid = |field: &'static str, reason: String| NormalizeError::InvalidDraft {
        index,
        field,
        reason,
        excerpt: excerpt(&element.to_string()),
    };

    let object = element
        .as_object()
        .ok_or_else(|| invalid("record", "not a JSON object".to_string()))?;

    let kind = match object.get("type") {
        None | Some(Value::Null) => return Err(invalid("type", "missing".to_string())),
        Some(Value::String(s)) => s.parse::<EntryKind>().map_err(|_| {
            invalid("type", format!("must be income or expense, got {:?}", s))
        })?,
        Some(other) => return Err(invalid("type", format!("not a string: {}", other))),
    };

    let amount = parse_amount(object.get("amount").unwrap_or(&Value::Null))
        .map_err(|e| invalid("amount", e.to_string()))?;

    let category = match object.get("category") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => return Err(invalid("category", "empty".to_string())),
        None | Some(Value::Null) => return Err(invalid("category", "missing".to_string())),
        Some(other) => return Err(invalid("category", format!("not a string: {}", other))),
    };

    let description = match object.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };

    let date = match object.get("date") {
        None | Some(Value::Null) => today,
        Some(Value::String(s)) if s.trim().is_empty() => today,
        Some(Value::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| invalid("date", format!("not a YYYY-MM-DD date: {:?}", s)))?,
        Some(other) => return Err(invalid("date", format!("not a string: {}", other))),
    };

    let items = match object.get("items") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(Draft {
        kind,
        amount,
        category,
        description,
        date,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn single(raw: &str) -> Result<Normalized, NormalizeError> {
        normalize(raw, &NormalizeContext::single(today()))
    }

    fn multiple(raw: &str) -> Result<Normalized, NormalizeError> {
        normalize(raw, &NormalizeContext::multiple(today()))
    }

    #[test]
    fn test_fenced_json_object() {
        let raw = "```json\n{\"type\":\"expense\",\"amount\":10,\"category\":\"餐饮\",\"date\":\"2024-01-01\"}\n```";
        let result = single(raw).unwrap();
        assert_eq!(
            result,
            Normalized::Single(Draft {
                kind: EntryKind::Expense,
                amount: dec("10"),
                category: "餐饮".to_string(),
                description: String::new(),
                date: date("2024-01-01"),
                items: vec![],
            })
        );
    }

    #[test]
    fn test_fence_tag_is_case_insensitive() {
        let raw = "```JSON\n{\"type\":\"income\",\"amount\":1,\"category\":\"工资\"}\n```";
        assert!(matches!(single(raw), Ok(Normalized::Single(_))));

        let raw = "```\n{\"type\":\"income\",\"amount\":1,\"category\":\"工资\"}\n```";
        assert!(matches!(single(raw), Ok(Normalized::Single(_))));
    }

    #[test]
    fn test_unbalanced_fences() {
        // leading fence only
        let raw = "```json\n{\"type\":\"income\",\"amount\":1,\"category\":\"工资\"}";
        assert!(single(raw).is_ok());
        // trailing fence only
        let raw = "{\"type\":\"income\",\"amount\":1,\"category\":\"工资\"}\n```";
        assert!(single(raw).is_ok());
    }

    #[test]
    fn test_array_of_two_is_multiple() {
        let raw = r#"[{"type":"income","amount":5000,"category":"工资","date":"2024-02-01"},{"type":"expense","amount":20,"category":"交通","date":"2024-02-02"}]"#;
        let result = multiple(raw).unwrap();
        assert!(result.is_multiple());
        let drafts = result.into_drafts();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].kind, EntryKind::Income);
        assert_eq!(drafts[0].amount, dec("5000"));
        assert_eq!(drafts[0].category, "工资");
        assert_eq!(drafts[0].date, date("2024-02-01"));
        assert_eq!(drafts[1].kind, EntryKind::Expense);
        assert_eq!(drafts[1].amount, dec("20"));
        assert_eq!(drafts[1].date, date("2024-02-02"));
    }

    #[test]
    fn test_array_of_one_is_single() {
        let raw = r#"[{"type":"expense","amount":10,"category":"餐饮"}]"#;
        let result = multiple(raw).unwrap();
        assert!(!result.is_multiple());
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_multiple_rejected_when_not_allowed() {
        let raw = r#"[{"type":"expense","amount":1,"category":"a"},{"type":"expense","amount":2,"category":"b"}]"#;
        assert_eq!(
            single(raw),
            Err(NormalizeError::TooManyRecords { count: 2 })
        );
    }

    #[test]
    fn test_error_sentinel() {
        let result = multiple(r#"{"error":"无法解析"}"#);
        assert_eq!(result, Err(NormalizeError::Upstream("无法解析".to_string())));
        assert_eq!(result.unwrap_err().to_string(), "无法解析");
    }

    #[test]
    fn test_error_sentinel_inside_fence() {
        let raw = "```json\n{\"error\": \"无法识别图片内容\"}\n```";
        assert_eq!(
            single(raw),
            Err(NormalizeError::Upstream("无法识别图片内容".to_string()))
        );
    }

    #[test]
    fn test_empty_error_field_is_not_a_sentinel() {
        let raw = r#"{"error":"","type":"expense","amount":3,"category":"餐饮"}"#;
        assert!(single(raw).is_ok());
    }

    #[test]
    fn test_prose_without_json() {
        let raw = "抱歉，我无法理解这条消息。".repeat(30);
        match multiple(&raw) {
            Err(NormalizeError::NoStructuredData { excerpt, .. }) => {
                assert_eq!(excerpt.chars().count(), EXCERPT_CHARS);
                assert!(raw.starts_with(&excerpt));
            }
            other => panic!("expected NoStructuredData, got {:?}", other),
        }
    }

    #[test]
    fn test_short_prose_excerpt_is_whole_text() {
        let err = multiple("no idea").unwrap_err();
        assert_eq!(err.diagnostic(), Some("no idea"));
    }

    #[test]
    fn test_prose_around_json() {
        let raw = "好的，这是结果：\n[{\"type\":\"expense\",\"amount\":\"28.5\",\"category\":\"餐饮\"}]\n希望有帮助。";
        let result = multiple(raw).unwrap();
        let drafts = result.into_drafts();
        assert_eq!(drafts[0].amount, dec("28.5"));
        assert_eq!(drafts[0].date, today());
    }

    #[test]
    fn test_leading_prose_before_object() {
        let raw = "识别结果如下 {\"type\":\"income\",\"amount\":100,\"category\":\"红包\"}";
        match single(raw).unwrap() {
            Normalized::Single(draft) => {
                assert_eq!(draft.kind, EntryKind::Income);
                assert_eq!(draft.amount, dec("100"));
            }
            other => panic!("expected a single draft, got {:?}", other),
        }
    }

    #[test]
    fn test_broken_json_is_no_structured_data() {
        let raw = r#"[{"type":"expense","amount":10,"category":"餐饮"},]"#;
        assert!(matches!(
            multiple(raw),
            Err(NormalizeError::NoStructuredData { .. })
        ));

        let raw = r#"{"type":"expense""#;
        assert!(matches!(
            multiple(raw),
            Err(NormalizeError::NoStructuredData { .. })
        ));
    }

    #[test]
    fn test_empty_array() {
        assert_eq!(multiple("[]"), Err(NormalizeError::Empty));
        assert_eq!(multiple("```json\n[ ]\n```"), Err(NormalizeError::Empty));
    }

    #[test]
    fn test_missing_amount_names_index_and_field() {
        for position in 0..3 {
            let mut elements = vec![
                r#"{"type":"expense","amount":1,"category":"a"}"#;
                3
            ];
            elements[position] = r#"{"type":"expense","category":"a"}"#;
            let raw = format!("[{}]", elements.join(","));

            match multiple(&raw) {
                Err(NormalizeError::InvalidDraft { index, field, .. }) => {
                    assert_eq!(index, position + 1);
                    assert_eq!(field, "amount");
                }
                other => panic!("expected InvalidDraft, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_type_must_be_exact() {
        for bad in [r#""Income""#, r#""transfer""#, "1", "null"] {
            let raw = format!(r#"{{"type":{},"amount":1,"category":"a"}}"#, bad);
            match single(&raw) {
                Err(NormalizeError::InvalidDraft { index, field, .. }) => {
                    assert_eq!(index, 1);
                    assert_eq!(field, "type");
                }
                other => panic!("expected InvalidDraft for {}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_negative_or_non_numeric_amount() {
        for bad in ["-5", r#""abc""#, "true"] {
            let raw = format!(r#"{{"type":"expense","amount":{},"category":"a"}}"#, bad);
            assert!(
                matches!(
                    single(&raw),
                    Err(NormalizeError::InvalidDraft { field: "amount", .. })
                ),
                "amount {} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_numeric_string_amount_is_coerced() {
        let raw = r#"{"type":"expense","amount":"12.30","category":"a"}"#;
        let draft = single(raw).unwrap().into_drafts().remove(0);
        assert_eq!(draft.amount, dec("12.30"));
    }

    #[test]
    fn test_category_required() {
        for bad in [r#""""#, r#""  ""#, "null"] {
            let raw = format!(r#"{{"type":"expense","amount":1,"category":{}}}"#, bad);
            assert!(matches!(
                single(&raw),
                Err(NormalizeError::InvalidDraft { field: "category", .. })
            ));
        }
        let raw = r#"{"type":"expense","amount":1}"#;
        assert!(matches!(
            single(raw),
            Err(NormalizeError::InvalidDraft { field: "category", .. })
        ));
    }

    #[test]
    fn test_invalid_date() {
        let raw = r#"{"type":"expense","amount":1,"category":"a","date":"yesterday"}"#;
        let err = single(raw).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidDraft { field: "date", .. }));
        assert!(err.diagnostic().unwrap().contains("yesterday"));
    }

    #[test]
    fn test_missing_date_uses_context_today() {
        let raw = r#"{"type":"expense","amount":1,"category":"a"}"#;
        let ctx = NormalizeContext::single(date("1999-12-31"));
        let draft = normalize(raw, &ctx).unwrap().into_drafts().remove(0);
        assert_eq!(draft.date, date("1999-12-31"));
    }

    #[test]
    fn test_description_and_items() {
        let raw = r#"{"type":"expense","amount":36.8,"category":"购物","description":" 超市 ","items":["牛奶","面包",3]}"#;
        let draft = single(raw).unwrap().into_drafts().remove(0);
        assert_eq!(draft.description, "超市");
        assert_eq!(draft.items, vec!["牛奶", "面包", "3"]);

        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["type"], "expense");
        assert_eq!(json["date"], "2024-03-15");
        assert_eq!(json["items"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_draft_without_items_omits_field() {
        let raw = r#"{"type":"expense","amount":1,"category":"a"}"#;
        let draft = single(raw).unwrap().into_drafts().remove(0);
        let json = serde_json::to_value(&draft).unwrap();
        assert!(json.get("items").is_none());
        assert_eq!(json["description"], "");
    }

    #[test]
    fn test_non_object_element() {
        let raw = r#"[{"type":"expense","amount":1,"category":"a"}, 42]"#;
        assert!(matches!(
            multiple(raw),
            Err(NormalizeError::InvalidDraft { index: 2, field: "record", .. })
        ));
    }

    #[test]
    fn test_same_input_same_output() {
        let raw = r#"[{"type":"expense","amount":1,"category":"a"},{"type":"income","amount":2,"category":"b"}]"#;
        assert_eq!(multiple(raw), multiple(raw));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "账".repeat(500);
        let cut = excerpt(&text);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS);
    }

    #[test]
    fn test_into_new_record() {
        let raw = r#"{"type":"income","amount":5000,"category":"工资","description":"三月工资"}"#;
        let draft = single(raw).unwrap().into_drafts().remove(0);
        let record = draft.into_new_record(Some(3));
        assert_eq!(record.kind, EntryKind::Income);
        assert_eq!(record.description, "三月工资");
        assert_eq!(record.wallet_id, Some(3));
    }
}
