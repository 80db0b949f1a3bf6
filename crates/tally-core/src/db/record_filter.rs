//! Record filter builder for constructing dynamic SQL queries
//!
//! This module provides a builder pattern for constructing WHERE clauses
//! and related SQL components for record queries. Every value is bound as
//! a `?` parameter; nothing the caller passes reaches the SQL text.

use chrono::NaiveDate;

use crate::models::EntryKind;

/// Builder for constructing record query filters
///
/// Shared by `list_records`, `count_records` and the stats queries so the
/// predicates stay identical across them.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub kind: Option<EntryKind>,
    pub category: Option<String>,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: &'static str,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl RecordFilter {
    /// Create a new filter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Only records on or after this date
    pub fn date_from(mut self, date: Option<NaiveDate>) -> Self {
        self.date_from = date;
        self
    }

    /// Only records on or before this date
    pub fn date_to(mut self, date: Option<NaiveDate>) -> Self {
        self.date_to = date;
        self
    }

    /// Only income or only expense
    pub fn kind(mut self, kind: Option<EntryKind>) -> Self {
        self.kind = kind;
        self
    }

    /// Exact category name; blank is treated as no filter
    pub fn category(mut self, category: Option<&str>) -> Self {
        self.category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self
    }

    /// Build the filter components
    pub fn build(&self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(from) = self.date_from {
            conditions.push("date >= ?");
            params.push(Box::new(from.to_string()));
        }

        if let Some(to) = self.date_to {
            conditions.push("date <= ?");
            params.push(Box::new(to.to_string()));
        }

        if let Some(kind) = self.kind {
            conditions.push("type = ?");
            params.push(Box::new(kind.as_str()));
        }

        if let Some(ref category) = self.category {
            conditions.push("category = ?");
            params.push(Box::new(category.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        FilterResult {
            where_clause,
            order_clause: "ORDER BY date DESC, created_at DESC, id DESC",
            params,
        }
    }
}

impl FilterResult {
    /// Build a COUNT query
    pub fn build_count_query(&self) -> String {
        format!("SELECT COUNT(*) FROM records {}", self.where_clause)
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Get the owned parameter vector to append pagination params
    pub fn into_params(self) -> Vec<Box<dyn rusqlite::ToSql>> {
        self.params
    }
}
