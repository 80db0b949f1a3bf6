//! Record handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use tally_core::money::parse_amount;
use tally_core::{EntryKind, NewRecord, Record, RecordFilter, RecordUpdate};

use super::parse_optional_date;
use crate::{
    parse_json, ApiResponse, AppError, AppState, AuthUser, Pagination, DEFAULT_PAGE_LIMIT,
    MAX_PAGE_LIMIT,
};

pub(crate) const RECORD_NOT_FOUND: &str = "记录不存在";

/// Query parameters for listing records
///
/// Numbers arrive as text and fall back to defaults when unreadable.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Parse an optional `type` value
pub(crate) fn parse_kind(value: Option<&str>) -> Result<Option<EntryKind>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| AppError::bad_request("无效的类型，必须是 income 或 expense")),
    }
}

/// Clamp pagination parameters: page >= 1, 1 <= limit <= MAX_PAGE_LIMIT
fn page_params(query: &RecordQuery) -> (i64, i64) {
    let page = query
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(1)
        .max(1);
    let limit = query
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    (page, limit)
}

/// GET /api/records - List records, newest first
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordQuery>,
) -> Result<ApiResponse<Vec<Record>>, AppError> {
    let (page, limit) = page_params(&query);

    let filter = RecordFilter::new()
        .kind(parse_kind(query.kind.as_deref())?)
        .category(query.category.as_deref())
        .date_from(parse_optional_date(query.start_date.as_deref(), "startDate")?)
        .date_to(parse_optional_date(query.end_date.as_deref(), "endDate")?);

    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::bad_request("页码过大"))?;

    let total = state.db.count_records(&filter)?;
    let records = state.db.list_records(&filter, limit, offset)?;

    Ok(ApiResponse::ok(records).with_pagination(Pagination::new(page, limit, total)))
}

/// Read a required field out of a JSON object
fn required<'a>(body: &'a Map<String, Value>, field: &str) -> Result<&'a Value, AppError> {
    match body.get(field) {
        None | Some(Value::Null) => Err(AppError::bad_request(
            "缺少必填字段: type, amount, category, date",
        )),
        Some(Value::String(s)) if s.trim().is_empty() => Err(AppError::bad_request(
            "缺少必填字段: type, amount, category, date",
        )),
        Some(value) => Ok(value),
    }
}

fn field_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, AppError> {
    value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| AppError::bad_request(&format!("{} 必须是字符串", field)))
}

fn field_kind(value: &Value) -> Result<EntryKind, AppError> {
    parse_kind(Some(field_str(value, "type")?))?
        .ok_or_else(|| AppError::bad_request("无效的类型，必须是 income 或 expense"))
}

fn field_amount(value: &Value) -> Result<rust_decimal::Decimal, AppError> {
    parse_amount(value).map_err(|e| AppError::bad_request(&format!("无效的金额: {}", e)))
}

fn field_date(value: &Value) -> Result<chrono::NaiveDate, AppError> {
    parse_optional_date(Some(field_str(value, "date")?), "date")?
        .ok_or_else(|| AppError::bad_request("缺少必填字段: date"))
}

fn field_wallet(value: &Value) -> Result<Option<i64>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| AppError::bad_request("无效的钱包 ID")),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::bad_request("无效的钱包 ID")),
        _ => Err(AppError::bad_request("无效的钱包 ID")),
    }
}

/// Build a new record from a request body, naming the first bad field
pub(crate) fn new_record_from_json(body: &Map<String, Value>) -> Result<NewRecord, AppError> {
    let kind = field_kind(required(body, "type")?)?;
    let amount = field_amount(required(body, "amount")?)?;
    let category = field_str(required(body, "category")?, "category")?.to_string();
    let date = field_date(required(body, "date")?)?;

    let description = match body.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(value) => field_str(value, "description")?.to_string(),
    };
    let wallet_id = match body.get("wallet_id") {
        None => None,
        Some(value) => field_wallet(value)?,
    };

    Ok(NewRecord {
        kind,
        amount,
        category,
        description,
        date,
        wallet_id,
    })
}

/// Build a partial update; absent keys keep their value, `wallet_id: null` detaches
pub(crate) fn record_update_from_json(body: &Map<String, Value>) -> Result<RecordUpdate, AppError> {
    let present = |field: &str| body.get(field).filter(|v| !v.is_null());

    Ok(RecordUpdate {
        kind: present("type").map(field_kind).transpose()?,
        amount: present("amount").map(field_amount).transpose()?,
        category: present("category")
            .map(|v| field_str(v, "category").map(str::to_string))
            .transpose()?
            .filter(|c| !c.is_empty()),
        description: present("description")
            .map(|v| field_str(v, "description").map(str::to_string))
            .transpose()?,
        date: present("date").map(field_date).transpose()?,
        wallet_id: body.get("wallet_id").map(field_wallet).transpose()?,
    })
}

fn json_object(body: &Bytes) -> Result<Map<String, Value>, AppError> {
    match parse_json::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::bad_request("Invalid JSON")),
    }
}

/// POST /api/records - Create a record
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<(StatusCode, ApiResponse<Record>), AppError> {
    let new_record = new_record_from_json(&json_object(&body)?)?;

    let record = state
        .db
        .create_record(&new_record)
        .map_err(AppError::from_core)?;

    info!(user = %user.username, id = record.id, kind = %record.kind, "Created record");

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(record).with_message("记录已创建"),
    ))
}

/// GET /api/records/:id - Get a single record
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Record>, AppError> {
    let record = state
        .db
        .get_record(id)?
        .ok_or_else(|| AppError::not_found(RECORD_NOT_FOUND))?;

    Ok(ApiResponse::ok(record))
}

/// PUT /api/records/:id - Update a record
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<ApiResponse<Record>, AppError> {
    let update = record_update_from_json(&json_object(&body)?)?;

    let record = state
        .db
        .update_record(id, &update)
        .map_err(AppError::from_core)?
        .ok_or_else(|| AppError::not_found(RECORD_NOT_FOUND))?;

    info!(user = %user.username, id, "Updated record");

    Ok(ApiResponse::ok(record).with_message("记录已更新"))
}

/// DELETE /api/records/:id - Delete a record
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    if !state.db.delete_record(id)? {
        return Err(AppError::not_found(RECORD_NOT_FOUND));
    }

    info!(user = %user.username, id, "Deleted record");

    Ok(ApiResponse::message_only("记录已删除"))
}
