//! Narrative financial analysis
//!
//! Renders a statistics summary into the text the model reads, and reads the
//! model's JSON answer back. The model is told to answer with JSON; when it
//! does not, its whole reply is kept as the analysis text.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::models::Record;
use crate::money::format_money;
use crate::stats::{summarize, CategoryTotals, Granularity, StatsOptions, Summary};

use super::AIBackend;

/// Shown instead of an analysis when there are no records
pub const EMPTY_ANALYSIS: &str = "暂无记录数据，无法生成分析报告。请先添加一些收支记录。";

/// Suggestions shown with [`EMPTY_ANALYSIS`]
pub const EMPTY_SUGGESTIONS: &[&str] = &["开始记录您的日常收支", "可以使用自然语言或图片快速记账"];

/// Shown when the model call fails
pub const DEGRADED_ANALYSIS: &str = "AI 分析服务暂时不可用，以下是您的数据统计摘要。";

/// Number of recent records listed in the summary text
const RECENT_RECORDS: usize = 10;

/// Optional date bounds of an analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// The model's reading of the numbers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis: String,
    pub suggestions: Vec<String>,
    pub highlights: Vec<String>,
    /// 0 to 100; 0 when the model gave none
    pub health_score: u8,
}

impl Analysis {
    pub fn empty_data() -> Self {
        Self {
            analysis: EMPTY_ANALYSIS.to_string(),
            suggestions: EMPTY_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn degraded() -> Self {
        Self {
            analysis: DEGRADED_ANALYSIS.to_string(),
            ..Default::default()
        }
    }
}

/// Income, expense and record count of one calendar month
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthTotals {
    pub income: Decimal,
    pub expense: Decimal,
    pub count: usize,
}

/// The statistics half of an analysis report
///
/// Months are a `YYYY-MM` keyed map rather than the dashboard's period list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_balance: Decimal,
    pub savings_rate: Decimal,
    pub record_count: usize,
    pub by_category: CategoryTotals,
    /// Ascending by month
    pub by_month: BTreeMap<String, MonthTotals>,
}

impl From<Summary> for AnalysisStats {
    /// `summary` must be month-bucketed
    fn from(summary: Summary) -> Self {
        let by_month = summary
            .by_period
            .into_iter()
            .map(|p| {
                let totals = MonthTotals {
                    income: p.income,
                    expense: p.expense,
                    count: p.count,
                };
                (p.period, totals)
            })
            .collect();

        Self {
            total_income: summary.total_income,
            total_expense: summary.total_expense,
            net_balance: summary.net_balance,
            savings_rate: summary.savings_rate,
            record_count: summary.record_count,
            by_category: summary.by_category,
            by_month,
        }
    }
}

/// Statistics plus narrative, as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub stats: AnalysisStats,
    #[serde(flatten)]
    pub analysis: Analysis,
    /// Set when the narrative could not be produced
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ai_error: bool,
}

/// Summarize `records` (newest first) and ask the model to comment on them
///
/// No records: canned text, no model call. Model failure: the statistics
/// with a degraded message and `ai_error` set.
pub async fn analyze_records<B>(backend: &B, records: &[Record], range: DateRange) -> AnalysisReport
where
    B: AIBackend + ?Sized,
{
    let options = StatsOptions {
        granularity: Granularity::Month,
        period_limit: None,
    };
    let summary = summarize(records, &options);

    if summary.is_empty() {
        return AnalysisReport {
            stats: summary.into(),
            analysis: Analysis::empty_data(),
            ai_error: false,
        };
    }

    let summary_text = build_data_summary(&summary, records, range);
    let stats = AnalysisStats::from(summary);
    match backend.analyze(&summary_text).await {
        Ok(raw) => AnalysisReport {
            stats,
            analysis: parse_analysis(&raw),
            ai_error: false,
        },
        Err(e) => {
            warn!(error = %e, "Analysis model call failed, returning statistics only");
            AnalysisReport {
                stats,
                analysis: Analysis::degraded(),
                ai_error: true,
            }
        }
    }
}

/// Render the prompt input for the analysis model
///
/// `summary` should be month-bucketed; `records` newest first.
pub fn build_data_summary(summary: &Summary, records: &[Record], range: DateRange) -> String {
    let bound = |date: Option<NaiveDate>| {
        date.map(|d| d.to_string())
            .unwrap_or_else(|| "全部".to_string())
    };

    let mut lines = vec![
        format!("分析时间范围: {} 至 {}", bound(range.start), bound(range.end)),
        format!("总记录数: {}", summary.record_count),
        format!("总收入: ¥{}", format_money(summary.total_income)),
        format!("总支出: ¥{}", format_money(summary.total_expense)),
        format!("净余额: ¥{}", format_money(summary.net_balance)),
        format!("储蓄率: {}%", summary.savings_rate),
        String::new(),
        "按类别统计:".to_string(),
    ];

    for (category, totals) in summary.by_category.iter() {
        lines.push(format!(
            "- {}: 收入¥{}, 支出¥{}, {}笔",
            category,
            format_money(totals.income),
            format_money(totals.expense),
            totals.count
        ));
    }

    lines.push(String::new());
    lines.push("按月统计:".to_string());
    for period in &summary.by_period {
        lines.push(format!(
            "- {}: 收入¥{}, 支出¥{}",
            period.period,
            format_money(period.income),
            format_money(period.expense)
        ));
    }

    lines.push(String::new());
    lines.push(format!("最近{}条记录:", RECENT_RECORDS));
    for record in records.iter().take(RECENT_RECORDS) {
        let line = format!(
            "- {} {} ¥{} {} {}",
            record.date,
            record.kind.label(),
            format_money(record.amount),
            record.category,
            record.description
        );
        lines.push(line.trim_end().to_string());
    }

    lines.join("\n")
}

/// Read the model's analysis reply
pub fn parse_analysis(raw: &str) -> Analysis {
    let trimmed = raw.trim();
    let object = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
        }
        _ => None,
    };

    let Some(Value::Object(object)) = object else {
        return Analysis {
            analysis: trimmed.to_string(),
            ..Default::default()
        };
    };

    Analysis {
        analysis: object
            .get("analysis")
            .map(text_of)
            .unwrap_or_default(),
        suggestions: object.get("suggestions").map(list_of).unwrap_or_default(),
        highlights: object.get("highlights").map(list_of).unwrap_or_default(),
        health_score: object
            .get("healthScore")
            .and_then(score_of)
            .unwrap_or(0),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn list_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn score_of(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(score.round().clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::EntryKind;
    use crate::money::dec;
    use chrono::Utc;

    fn record(
        kind: EntryKind,
        amount: &str,
        category: &str,
        date: &str,
        description: &str,
    ) -> Record {
        Record {
            id: 0,
            kind,
            amount: dec(amount),
            category: category.to_string(),
            description: description.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            wallet_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_records() -> Vec<Record> {
        vec![
            record(EntryKind::Expense, "35.5", "餐饮", "2024-02-03", "午饭"),
            record(EntryKind::Income, "8000", "工资", "2024-02-01", "二月工资"),
            record(EntryKind::Expense, "120", "交通", "2024-01-20", ""),
        ]
    }

    #[test]
    fn test_build_data_summary() {
        let records = sample_records();
        let summary = summarize(&records, &StatsOptions::default());
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1),
            end: None,
        };
        let text = build_data_summary(&summary, &records, range);

        assert!(text.contains("分析时间范围: 2024-01-01 至 全部"));
        assert!(text.contains("总记录数: 3"));
        assert!(text.contains("总收入: ¥8000.00"));
        assert!(text.contains("总支出: ¥155.50"));
        assert!(text.contains("净余额: ¥7844.50"));
        assert!(text.contains("- 餐饮: 收入¥0.00, 支出¥35.50, 1笔"));
        assert!(text.contains("- 2024-01: 收入¥0.00, 支出¥120.00"));
        assert!(text.contains("- 2024-02-03 支出 ¥35.50 餐饮 午饭"));
        assert!(text.lines().any(|l| l == "- 2024-01-20 支出 ¥120.00 交通"));
        assert!(text.find("2024-01:").unwrap() < text.find("2024-02:").unwrap());
    }

    #[test]
    fn test_build_data_summary_lists_ten_recent() {
        let records: Vec<Record> = (1..=15)
            .map(|day| {
                record(
                    EntryKind::Expense,
                    "1",
                    "餐饮",
                    &format!("2024-03-{:02}", 16 - day),
                    &format!("r{}", day),
                )
            })
            .collect();
        let summary = summarize(&records, &StatsOptions::default());
        let text = build_data_summary(&summary, &records, DateRange::default());
        assert!(text.contains(" r10"));
        assert!(!text.contains(" r11"));
    }

    #[test]
    fn test_parse_analysis_json() {
        let raw = r#"```json
{"analysis":"收支健康","suggestions":["控制餐饮支出","建立应急基金"],"highlights":["储蓄率高"],"healthScore":82}
```"#;
        let analysis = parse_analysis(raw);
        assert_eq!(analysis.analysis, "收支健康");
        assert_eq!(analysis.suggestions.len(), 2);
        assert_eq!(analysis.highlights, vec!["储蓄率高"]);
        assert_eq!(analysis.health_score, 82);
    }

    #[test]
    fn test_parse_analysis_lenient_fields() {
        let raw = r#"{"analysis":"ok","suggestions":"只有一条","healthScore":"120"}"#;
        let analysis = parse_analysis(raw);
        assert_eq!(analysis.suggestions, vec!["只有一条"]);
        assert!(analysis.highlights.is_empty());
        assert_eq!(analysis.health_score, 100);
    }

    #[test]
    fn test_parse_analysis_plain_text_fallback() {
        let analysis = parse_analysis("  您的支出主要集中在餐饮。  ");
        assert_eq!(analysis.analysis, "您的支出主要集中在餐饮。");
        assert!(analysis.suggestions.is_empty());
        assert_eq!(analysis.health_score, 0);

        let analysis = parse_analysis("{not json}");
        assert_eq!(analysis.analysis, "{not json}");
    }

    #[test]
    fn test_report_serialization() {
        let report = AnalysisReport {
            stats: AnalysisStats::default(),
            analysis: Analysis::degraded(),
            ai_error: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["analysis"], DEGRADED_ANALYSIS);
        assert_eq!(json["aiError"], true);
        assert_eq!(json["stats"]["recordCount"], 0);
        assert!(json["suggestions"].as_array().unwrap().is_empty());

        let report = AnalysisReport {
            stats: AnalysisStats::default(),
            analysis: Analysis::empty_data(),
            ai_error: false,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("aiError").is_none());
        assert_eq!(json["suggestions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analyze_records_empty_skips_model() {
        // an unhealthy backend would fail if called
        let backend = MockBackend::unhealthy();
        let report = analyze_records(&backend, &[], DateRange::default()).await;
        assert_eq!(report.analysis.analysis, EMPTY_ANALYSIS);
        assert!(!report.ai_error);
        assert_eq!(report.stats.record_count, 0);
    }

    #[tokio::test]
    async fn test_analyze_records_degrades_on_failure() {
        let backend = MockBackend::unhealthy();
        let report = analyze_records(&backend, &sample_records(), DateRange::default()).await;
        assert!(report.ai_error);
        assert_eq!(report.analysis.analysis, DEGRADED_ANALYSIS);
        assert_eq!(report.stats.record_count, 3);
        assert_eq!(report.stats.total_income, dec("8000"));
    }

    #[tokio::test]
    async fn test_analyze_records_groups_by_month() {
        let backend = MockBackend::new();
        let report = analyze_records(&backend, &sample_records(), DateRange::default()).await;

        let months: Vec<&str> = report.stats.by_month.keys().map(String::as_str).collect();
        assert_eq!(months, vec!["2024-01", "2024-02"]);
        assert_eq!(report.stats.by_month["2024-01"].expense, dec("120"));
        assert_eq!(report.stats.by_month["2024-02"].income, dec("8000"));
        assert_eq!(report.stats.by_month["2024-02"].count, 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["byMonth"]["2024-02"]["expense"], 35.5);
        assert!(json["stats"].get("byPeriod").is_none());
    }

    #[tokio::test]
    async fn test_analyze_records_with_model_reply() {
        let backend = MockBackend::new().with_analysis_reply(
            r#"{"analysis":"不错","suggestions":["继续保持"],"highlights":[],"healthScore":90}"#,
        );
        let report = analyze_records(&backend, &sample_records(), DateRange::default()).await;
        assert!(!report.ai_error);
        assert_eq!(report.analysis.analysis, "不错");
        assert_eq!(report.analysis.health_score, 90);
    }
}
