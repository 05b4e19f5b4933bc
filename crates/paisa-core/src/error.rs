//! Error types for paisa

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the caller may usefully retry the failed operation.
    ///
    /// Only ledger outages qualify; everything else is a programming or
    /// data problem that a retry will not fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LedgerUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
