//! Error types for Tally

use thiserror::Error;

use crate::ai::NormalizeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Model response rejected: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("AI backend not configured: {0}")]
    AiNotConfigured(String),

    #[error("Upstream model error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, Error>;
