//! Dashboard statistics handler

use std::sync::Arc;

use axum::extract::{Query, State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::stats::{CategoryBreakdown, PeriodTotals};
use tally_core::{summarize, Granularity, Record, RecordFilter, StatsOptions};

use super::parse_optional_date;
use crate::{ApiResponse, AppError, AppState};

/// Number of newest records shown on the dashboard
const RECENT_RECORDS: i64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub group_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_balance: Decimal,
    pub savings_rate: Decimal,
    pub record_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub summary: SummaryTotals,
    pub by_category: CategoryBreakdown,
    /// Oldest first, at most twelve periods
    pub by_period: Vec<PeriodTotals>,
    pub recent_records: Vec<Record>,
}

/// GET /api/stats - Totals, category shares, period buckets and recent records
///
/// Unknown `groupBy` values fall back to month.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<ApiResponse<StatsResponse>, AppError> {
    let granularity = query
        .group_by
        .as_deref()
        .and_then(|g| g.parse::<Granularity>().ok())
        .unwrap_or_default();

    let filter = RecordFilter::new()
        .date_from(parse_optional_date(query.start_date.as_deref(), "startDate")?)
        .date_to(parse_optional_date(query.end_date.as_deref(), "endDate")?);

    let records = state.db.all_records(&filter)?;
    let summary = summarize(&records, &StatsOptions::dashboard(granularity));
    let recent_records = state.db.recent_records(&filter, RECENT_RECORDS)?;

    Ok(ApiResponse::ok(StatsResponse {
        by_category: summary.category_breakdown(),
        summary: SummaryTotals {
            total_income: summary.total_income,
            total_expense: summary.total_expense,
            net_balance: summary.net_balance,
            savings_rate: summary.savings_rate,
            record_count: summary.record_count,
        },
        by_period: summary.by_period,
        recent_records,
    }))
}
