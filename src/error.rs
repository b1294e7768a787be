use thiserror::Error;

/// Errors surfaced by the journal engines and their storage.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("duplicate source key: {0}")]
    Duplicate(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl JournalError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        JournalError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JournalError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
