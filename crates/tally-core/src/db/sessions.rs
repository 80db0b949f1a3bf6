//! Login session operations
//!
//! Callers pass `now` explicitly so expiry is decided in one place and tests
//! can move the clock.

use chrono::{DateTime, Duration, Timelike, Utc};
use rusqlite::params;
use tracing::debug;

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::Session;

/// Result of checking a session token
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    Valid(Session),
    /// No session with this token
    Missing,
    /// The session had expired and has now been deleted
    Expired,
}

impl Database {
    /// Start a session for `username`, replacing any it already has
    pub fn create_session(
        &self,
        username: &str,
        expiry_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        // stored at second precision
        let now = now.with_nanosecond(0).unwrap_or(now);
        let expires_at = Duration::try_hours(expiry_hours)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::InvalidData(format!("session lifetime out of range: {expiry_hours}h"))
            })?;
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            expires_at,
            created_at: now,
        };

        let conn = self.conn()?;
        let replaced = conn.execute("DELETE FROM sessions WHERE username = ?", params![username])?;
        if replaced > 0 {
            debug!(username, replaced, "Replaced existing sessions");
        }

        conn.execute(
            "INSERT INTO sessions (token, username, expires_at, created_at) VALUES (?, ?, ?, ?)",
            params![
                session.token,
                session.username,
                format_datetime(session.expires_at),
                format_datetime(session.created_at),
            ],
        )?;

        Ok(session)
    }

    /// Look up a session by token without judging expiry
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT token, username, expires_at, created_at FROM sessions WHERE token = ?",
                params![token],
                |row| {
                    let expires_at_str: String = row.get(2)?;
                    let created_at_str: String = row.get(3)?;
                    Ok(Session {
                        token: row.get(0)?,
                        username: row.get(1)?,
                        expires_at: parse_datetime(&expires_at_str),
                        created_at: parse_datetime(&created_at_str),
                    })
                },
            )
            .ok();

        Ok(session)
    }

    /// Resolve a token, deleting the session if it has expired by `now`
    pub fn get_valid_session(&self, token: &str, now: DateTime<Utc>) -> Result<SessionLookup> {
        let Some(session) = self.get_session(token)? else {
            return Ok(SessionLookup::Missing);
        };

        if session.is_expired(now) {
            self.delete_session(token)?;
            debug!(username = %session.username, "Deleted expired session");
            return Ok(SessionLookup::Expired);
        }

        Ok(SessionLookup::Valid(session))
    }

    /// Delete a session; returns false when there was none
    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sessions WHERE token = ?", params![token])?;
        Ok(deleted > 0)
    }

    /// Remove every session that has expired by `now`
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let purged = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?",
            params![format_datetime(now)],
        )?;
        Ok(purged)
    }
}
