//! AI handlers: text parsing, receipt OCR and narrative analysis
//!
//! The model's raw reply always goes through the normalizer; these handlers
//! only decide how each outcome is reported.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Extension};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tally_core::{
    analyze_records, normalize, AIBackend, AIClient, AnalysisReport, DateRange, Draft,
    NormalizeContext, NormalizeError, Normalized, RecordFilter,
};

use super::{parse_optional_date, records::parse_kind};
use crate::{parse_json, ApiResponse, AppError, AppState, AuthUser};

/// Reported when no AI backend is configured
pub const AI_NOT_CONFIGURED: &str = "AI API 未配置";

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct OcrRequest {
    /// Base64 image or `data:` URL
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// One draft, or several flagged with `multiple: true`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DraftPayload {
    Single(Draft),
    Multiple(Vec<Draft>),
}

impl From<Normalized> for ApiResponse<DraftPayload> {
    fn from(normalized: Normalized) -> Self {
        match normalized {
            Normalized::Single(draft) => ApiResponse::ok(DraftPayload::Single(draft)),
            Normalized::Multiple(drafts) => {
                ApiResponse::ok(DraftPayload::Multiple(drafts)).multiple()
            }
        }
    }
}

/// Report a normalizer rejection
///
/// The model's own error text goes back verbatim. Replies with no readable
/// JSON are an upstream fault (502); replies with bad records are 400s.
pub fn normalize_error(err: NormalizeError) -> AppError {
    match err {
        NormalizeError::Upstream(message) => AppError::bad_request(&message),
        NormalizeError::NoStructuredData { reason, excerpt } => {
            warn!(reason = %reason, "Model reply had no structured data");
            AppError::bad_gateway("解析AI响应失败")
                .with_debug(format!("{} | 原始内容: {}", reason, excerpt))
        }
        NormalizeError::InvalidDraft { index, .. } => {
            AppError::bad_request(&format!("第{}条记录数据不完整", index)).with_debug(&err)
        }
        NormalizeError::Empty | NormalizeError::TooManyRecords { .. } => {
            AppError::bad_request("AI返回数据格式错误").with_debug(&err)
        }
    }
}

fn ai_client(state: &AppState) -> Result<&AIClient, AppError> {
    state
        .ai
        .as_ref()
        .ok_or_else(|| AppError::internal(AI_NOT_CONFIGURED))
}

/// POST /api/ai/parse - Turn free text into one or more draft records
pub async fn ai_parse(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<ApiResponse<DraftPayload>, AppError> {
    let req: ParseRequest = parse_json(&body)?;
    let text = req.text.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("请输入文本"));
    }

    let client = ai_client(&state)?;
    let today = Local::now().date_naive();
    let categories = state.db.list_categories(None)?;

    let raw = client
        .parse_text(text, &categories, today)
        .await
        .map_err(AppError::from_core)?;

    let normalized =
        normalize(&raw, &NormalizeContext::multiple(today)).map_err(normalize_error)?;

    info!(user = %user.username, drafts = normalized.len(), "Parsed text into drafts");

    Ok(normalized.into())
}

/// POST /api/ai/ocr - Read a single draft record off a receipt image
pub async fn ai_ocr(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<ApiResponse<DraftPayload>, AppError> {
    let req: OcrRequest = parse_json(&body)?;
    if req.image.trim().is_empty() {
        return Err(AppError::bad_request("请上传图片"));
    }

    let client = ai_client(&state)?;
    let today = Local::now().date_naive();
    let categories = state.db.list_categories(None)?;

    let raw = client
        .parse_receipt(&req.image, &categories, today)
        .await
        .map_err(AppError::from_core)?;

    let normalized =
        normalize(&raw, &NormalizeContext::single(today)).map_err(normalize_error)?;

    info!(user = %user.username, "Read receipt into draft");

    Ok(normalized.into())
}

/// POST /api/ai/analyze - Statistics plus the model's narrative
///
/// An empty body analyzes every record.
pub async fn ai_analyze(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<ApiResponse<AnalysisReport>, AppError> {
    let req: AnalyzeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AnalyzeRequest::default()
    } else {
        parse_json(&body)?
    };

    let client = ai_client(&state)?;

    let range = DateRange {
        start: parse_optional_date(req.start_date.as_deref(), "startDate")?,
        end: parse_optional_date(req.end_date.as_deref(), "endDate")?,
    };
    let filter = RecordFilter::new()
        .date_from(range.start)
        .date_to(range.end)
        .kind(parse_kind(req.kind.as_deref())?);

    let records = state.db.all_records(&filter)?;
    let report = analyze_records(client, &records, range).await;

    info!(
        user = %user.username,
        records = records.len(),
        ai_error = report.ai_error,
        "Generated analysis"
    );

    Ok(ApiResponse::ok(report))
}
