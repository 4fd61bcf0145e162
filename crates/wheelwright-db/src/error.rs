//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for wheelwright_core::Error {
    fn from(e: DbError) -> Self {
        wheelwright_core::Error::Catalog(e.to_string())
    }
}
