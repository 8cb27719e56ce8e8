/// Error types for the script store and the page executor
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stored scripts are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// The page refused to run the code (CSP, script error, ...)
    #[error("Page rejected script execution: {0}")]
    Rejected(String),

    /// The tab went away or cannot be scripted
    #[error("Tab unavailable: {0}")]
    Unavailable(String),
}
