use thiserror::Error;

use crate::storage::assets::UploadError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Page number {page_number} is already taken: {detail}")]
    UniqueViolation { page_number: i64, detail: String },
    #[error("Could not allocate a page number for episode {episode_id} after {attempts} attempts")]
    NumberingConflict { episode_id: String, attempts: u32 },
    #[error("Stale reference: {0}")]
    StaleReference(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// True when the error is the store rejecting a duplicate page number.
    /// The allocator retries on exactly this class and nothing else.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, AppError::UniqueViolation { .. })
    }
}
