//! Error types for tasksync.

use thiserror::Error;

/// Errors raised while retrieving or parsing the calendar feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned status {0}")]
    Status(u16),

    #[error("ICS parse error: {0}")]
    Parse(String),
}

/// Errors raised by a row store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited by the store")]
    RateLimited,

    #[error("Store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed store response: {0}")]
    Malformed(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Row not found: {0}")]
    RowNotFound(usize),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Errors that are expected to clear up on their own before the next run.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::RateLimited | StoreError::Http(_) => true,
            StoreError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors that abort a reconciliation run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for reconciliation runs.
pub type SyncResult<T> = Result<T, SyncError>;
