//! Ledger record operations

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{cents, parse_datetime, Database, RecordFilter};
use crate::error::{Error, Result};
use crate::models::{NewRecord, Record, RecordUpdate};
use crate::money::from_minor_units;

const RECORD_COLUMNS: &str =
    "id, type, amount, category, description, date, wallet_id, created_at, updated_at";

fn row_to_record(row: &Row) -> rusqlite::Result<Record> {
    let kind_str: String = row.get(1)?;
    let date_str: String = row.get(5)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let conversion_error = |idx: usize, msg: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            msg.into(),
        )
    };

    Ok(Record {
        id: row.get(0)?,
        kind: kind_str.parse().map_err(|e: String| conversion_error(1, e))?,
        amount: from_minor_units(row.get(2)?),
        category: row.get(3)?,
        description: row.get(4)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| conversion_error(5, e.to_string()))?,
        wallet_id: row.get(6)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

impl Database {
    /// Insert a record and return it as stored
    pub fn create_record(&self, record: &NewRecord) -> Result<Record> {
        if let Some(wallet_id) = record.wallet_id {
            self.ensure_wallet_exists(wallet_id)?;
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO records (type, amount, category, description, date, wallet_id) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.kind.as_str(),
                cents(record.amount)?,
                record.category.trim(),
                record.description.trim(),
                record.date.to_string(),
                record.wallet_id,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_record(id)?
            .ok_or_else(|| Error::NotFound(format!("record {}", id)))
    }

    /// Get a record by ID
    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS),
                params![id],
                row_to_record,
            )
            .ok();

        Ok(record)
    }

    /// Apply a partial update; returns None when the record does not exist
    pub fn update_record(&self, id: i64, update: &RecordUpdate) -> Result<Option<Record>> {
        if self.get_record(id)?.is_none() {
            return Ok(None);
        }
        if update.is_empty() {
            return self.get_record(id);
        }
        if let Some(Some(wallet_id)) = update.wallet_id {
            self.ensure_wallet_exists(wallet_id)?;
        }

        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(kind) = update.kind {
            sets.push("type = ?");
            values.push(Box::new(kind.as_str()));
        }
        if let Some(amount) = update.amount {
            sets.push("amount = ?");
            values.push(Box::new(cents(amount)?));
        }
        if let Some(ref category) = update.category {
            sets.push("category = ?");
            values.push(Box::new(category.trim().to_string()));
        }
        if let Some(ref description) = update.description {
            sets.push("description = ?");
            values.push(Box::new(description.trim().to_string()));
        }
        if let Some(date) = update.date {
            sets.push("date = ?");
            values.push(Box::new(date.to_string()));
        }
        if let Some(wallet_id) = update.wallet_id {
            sets.push("wallet_id = ?");
            values.push(Box::new(wallet_id));
        }
        values.push(Box::new(id));

        let sql = format!(
            "UPDATE records SET {}, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            sets.join(", ")
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        self.conn()?.execute(&sql, params_refs.as_slice())?;

        self.get_record(id)
    }

    /// Delete a record; returns false when nothing was deleted
    pub fn delete_record(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM records WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// List one page of matching records, newest first
    pub fn list_records(
        &self,
        filter: &RecordFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>> {
        let result = filter.build();
        let sql = format!(
            "SELECT {} FROM records {} {} LIMIT ? OFFSET ?",
            RECORD_COLUMNS, result.where_clause, result.order_clause
        );

        let mut params = result.into_params();
        params.push(Box::new(limit));
        params.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_refs.as_slice(), row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Every matching record, newest first (for aggregation)
    pub fn all_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let result = filter.build();
        let sql = format!(
            "SELECT {} FROM records {} {}",
            RECORD_COLUMNS, result.where_clause, result.order_clause
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(result.params_refs().as_slice(), row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count matching records
    pub fn count_records(&self, filter: &RecordFilter) -> Result<i64> {
        let result = filter.build();
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &result.build_count_query(),
            result.params_refs().as_slice(),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// The newest records matching the filter
    pub fn recent_records(&self, filter: &RecordFilter, limit: i64) -> Result<Vec<Record>> {
        self.list_records(filter, limit, 0)
    }
}
