//! Category handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use tally_core::Category;

use super::records::parse_kind;
use crate::{parse_json, ApiResponse, AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Request body for creating a category
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// GET /api/categories - List categories, optionally of one type
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryQuery>,
) -> Result<ApiResponse<Vec<Category>>, AppError> {
    let kind = parse_kind(query.kind.as_deref())?;
    let categories = state.db.list_categories(kind)?;
    Ok(ApiResponse::ok(categories))
}

/// POST /api/categories - Create a category (no-op when it already exists)
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, ApiResponse<Category>), AppError> {
    let req: CreateCategoryRequest = parse_json(&body)?;

    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    let kind = parse_kind(req.kind.as_deref())?;
    let (false, Some(kind)) = (name.is_empty(), kind) else {
        return Err(AppError::bad_request("缺少必填字段: name, type"));
    };

    let mut category = Category::new(name, kind);
    if let Some(icon) = req.icon.as_deref().filter(|s| !s.trim().is_empty()) {
        category = category.with_icon(icon);
    }
    if let Some(color) = req.color.as_deref().filter(|s| !s.trim().is_empty()) {
        category = category.with_color(color);
    }

    let stored = state
        .db
        .add_category(&category)
        .map_err(AppError::from_core)?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(stored).with_message("类别已创建"),
    ))
}
