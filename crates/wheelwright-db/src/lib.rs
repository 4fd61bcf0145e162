//! PostgreSQL catalog accessor for the wheelwright build master.

pub mod catalog;
pub mod error;

pub use catalog::{DEFAULT_FETCH_SIZE, PgCatalog, PgScanCursor};
pub use error::{DbError, DbResult};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await?;
    Ok(pool)
}
