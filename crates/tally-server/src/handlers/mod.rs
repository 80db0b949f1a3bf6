//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod ai;
pub mod auth;
pub mod categories;
pub mod records;
pub mod stats;
pub mod wallets;

// Re-export all handlers for use in router
pub use ai::*;
pub use auth::*;
pub use categories::*;
pub use records::*;
pub use stats::*;
pub use wallets::*;

use chrono::NaiveDate;

use crate::AppError;

/// Parse an optional `YYYY-MM-DD` query or body value
///
/// Blank values count as absent.
pub(crate) fn parse_optional_date(
    value: Option<&str>,
    field: &str,
) -> Result<Option<NaiveDate>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::bad_request(&format!("无效的日期 {}: {}", field, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optional_date() {
        assert_eq!(parse_optional_date(None, "startDate").unwrap(), None);
        assert_eq!(parse_optional_date(Some("  "), "startDate").unwrap(), None);
        assert_eq!(
            parse_optional_date(Some("2024-03-01"), "startDate").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        let err = parse_optional_date(Some("2024/03/01"), "endDate").unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
