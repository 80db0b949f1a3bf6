//! Wallet handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use tally_core::{NewWallet, WalletBalance, WalletDeletion, WalletKind, WalletUpdate};

use crate::{parse_json, ApiResponse, AppError, AppState, AuthUser};

const WALLET_NOT_FOUND: &str = "钱包不存在";

/// Request body for creating or updating a wallet
///
/// Every field is optional here; creation checks `name` and `type` itself.
#[derive(Debug, Default, Deserialize)]
pub struct WalletRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub balance: Option<Decimal>,
    pub credit_limit: Option<Decimal>,
    /// `true`/`false` or 1/0
    pub is_default: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CreatedWallet {
    pub id: i64,
}

fn parse_wallet_kind(value: &str) -> Result<WalletKind, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request(&format!("无效的钱包类型: {}", value)))
}

/// JSON truthiness for flags sent as booleans or numbers
fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// GET /api/wallets - List wallets with derived balances
pub async fn list_wallets(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Vec<WalletBalance>>, AppError> {
    let wallets = state.db.list_wallets()?;
    Ok(ApiResponse::ok(wallets))
}

/// POST /api/wallets - Create a wallet
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<(StatusCode, ApiResponse<CreatedWallet>), AppError> {
    let req: WalletRequest = parse_json(&body)?;

    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    let kind = req.kind.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || kind.is_empty() {
        return Err(AppError::bad_request("请填写钱包名称和类型"));
    }

    let wallet = NewWallet {
        name: name.to_string(),
        kind: parse_wallet_kind(kind)?,
        balance: req.balance.unwrap_or_default(),
        credit_limit: req.credit_limit.unwrap_or_default(),
        is_default: req.is_default.as_ref().is_some_and(flag),
        icon: non_blank(req.icon),
        color: non_blank(req.color),
    };

    let id = state
        .db
        .create_wallet(&wallet)
        .map_err(AppError::from_core)?;

    info!(user = %user.username, id, kind = %wallet.kind, "Created wallet");

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(CreatedWallet { id }).with_message("钱包已创建"),
    ))
}

/// GET /api/wallets/:id - Get a wallet with derived balances
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<WalletBalance>, AppError> {
    let wallet = state
        .db
        .get_wallet(id)?
        .ok_or_else(|| AppError::not_found(WALLET_NOT_FOUND))?;

    Ok(ApiResponse::ok(wallet))
}

/// PUT /api/wallets/:id - Update a wallet
pub async fn update_wallet(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<ApiResponse<WalletBalance>, AppError> {
    let req: WalletRequest = parse_json(&body)?;

    let update = WalletUpdate {
        name: non_blank(req.name),
        kind: req
            .kind
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(parse_wallet_kind)
            .transpose()?,
        balance: req.balance,
        credit_limit: req.credit_limit,
        is_default: req
            .is_default
            .as_ref()
            .filter(|v| !v.is_null())
            .map(flag),
        icon: non_blank(req.icon),
        color: non_blank(req.color),
    };

    let wallet = state
        .db
        .update_wallet(id, &update)
        .map_err(AppError::from_core)?
        .ok_or_else(|| AppError::not_found(WALLET_NOT_FOUND))?;

    info!(user = %user.username, id, "Updated wallet");

    Ok(ApiResponse::ok(wallet).with_message("钱包已更新"))
}

/// DELETE /api/wallets/:id - Delete a wallet no record references
pub async fn delete_wallet(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    match state.db.delete_wallet(id)? {
        WalletDeletion::Deleted => {
            info!(user = %user.username, id, "Deleted wallet");
            Ok(ApiResponse::message_only("钱包已删除"))
        }
        WalletDeletion::NotFound => Err(AppError::not_found(WALLET_NOT_FOUND)),
        WalletDeletion::InUse(count) => Err(AppError::bad_request(&format!(
            "该钱包有 {} 条关联记录，无法删除",
            count
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flag_truthiness() {
        assert!(flag(&json!(true)));
        assert!(flag(&json!(1)));
        assert!(!flag(&json!(0)));
        assert!(!flag(&json!(false)));
        assert!(!flag(&json!(null)));
    }

    #[test]
    fn test_parse_wallet_kind() {
        assert_eq!(parse_wallet_kind("credit_card").unwrap(), WalletKind::CreditCard);
        assert!(parse_wallet_kind("piggy_bank").is_err());
    }
}
