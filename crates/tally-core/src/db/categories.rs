//! Category operations

use rusqlite::{params, Row};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Category, EntryKind};

fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    let kind_str: String = row.get(1)?;
    Ok(Category {
        name: row.get(0)?,
        kind: kind_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?,
        icon: row.get(2)?,
        color: row.get(3)?,
    })
}

impl Database {
    /// List categories, optionally of one type, ordered by type then name
    pub fn list_categories(&self, kind: Option<EntryKind>) -> Result<Vec<Category>> {
        let conn = self.conn()?;

        let categories = match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(
                    "SELECT name, type, icon, color FROM categories WHERE type = ? ORDER BY type, name",
                )?;
                let rows = stmt
                    .query_map(params![kind.as_str()], row_to_category)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare("SELECT name, type, icon, color FROM categories ORDER BY type, name")?;
                let rows = stmt
                    .query_map([], row_to_category)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(categories)
    }

    /// Create a category if the (name, type) pair is new
    ///
    /// An existing category keeps its icon and color; the stored row is returned.
    pub fn add_category(&self, category: &Category) -> Result<Category> {
        let name = category.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("category name is empty".into()));
        }

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO categories (name, type, icon, color) VALUES (?, ?, ?, ?)",
            params![name, category.kind.as_str(), category.icon, category.color],
        )?;
        if inserted == 0 {
            tracing::debug!(name, kind = %category.kind, "Category already exists");
        }

        let stored = conn.query_row(
            "SELECT name, type, icon, color FROM categories WHERE name = ? AND type = ?",
            params![name, category.kind.as_str()],
            row_to_category,
        )?;
        Ok(stored)
    }
}
