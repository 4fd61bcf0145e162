//! Catalog scans over a PostgreSQL server-side cursor.
//!
//! Each scan runs in its own read-only transaction holding a `NO SCROLL`
//! cursor over `builds_pending`, the catalog relation listing every
//! (abi_tag, package, version) that is neither built nor skipped. Rows are
//! fetched in batches of `fetch_size` and handed out one at a time.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::VecDeque;
use tracing::debug;
use wheelwright_core::{Catalog, PendingBuild, Result, ScanCursor};

use crate::DbResult;

pub const DEFAULT_FETCH_SIZE: u32 = 100;

const DECLARE_SCAN: &str = r#"
    DECLARE build_queue_scan NO SCROLL CURSOR FOR
    SELECT abi_tag, package, version
    FROM builds_pending
"#;

/// A row of `builds_pending`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PendingBuildRecord {
    abi_tag: String,
    package: String,
    version: String,
}

impl From<PendingBuildRecord> for PendingBuild {
    fn from(record: PendingBuildRecord) -> Self {
        PendingBuild {
            abi_tag: record.abi_tag,
            package: record.package,
            version: record.version,
        }
    }
}

fn fetch_statement(fetch_size: u32) -> String {
    format!("FETCH FORWARD {} FROM build_queue_scan", fetch_size.max(1))
}

/// PostgreSQL implementation of [`Catalog`].
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
    fetch_size: u32,
}

impl PgCatalog {
    pub fn new(pool: PgPool, fetch_size: u32) -> Self {
        Self { pool, fetch_size }
    }

    async fn open(&self) -> DbResult<PgScanCursor> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        sqlx::query(DECLARE_SCAN)
            .persistent(false)
            .execute(&mut *tx)
            .await?;
        Ok(PgScanCursor {
            tx: Some(tx),
            buffer: VecDeque::new(),
            fetch: fetch_statement(self.fetch_size),
        })
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn pending_builds(&self) -> Result<Box<dyn ScanCursor>> {
        Ok(Box::new(self.open().await?))
    }
}

/// An open scan. Dropping it before exhaustion rolls the transaction back.
pub struct PgScanCursor {
    tx: Option<Transaction<'static, Postgres>>,
    buffer: VecDeque<PendingBuild>,
    fetch: String,
}

impl std::fmt::Debug for PgScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgScanCursor")
            .field("open", &self.tx.is_some())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl PgScanCursor {
    async fn next(&mut self) -> DbResult<Option<PendingBuild>> {
        if let Some(build) = self.buffer.pop_front() {
            return Ok(Some(build));
        }
        let Some(tx) = self.tx.as_mut() else {
            return Ok(None);
        };

        let records: Vec<PendingBuildRecord> = sqlx::query_as(&self.fetch)
            .persistent(false)
            .fetch_all(&mut **tx)
            .await?;
        if records.is_empty() {
            if let Some(tx) = self.tx.take() {
                tx.commit().await?;
            }
            debug!("Catalog cursor exhausted");
            return Ok(None);
        }

        self.buffer
            .extend(records.into_iter().map(PendingBuild::from));
        Ok(self.buffer.pop_front())
    }
}

#[async_trait]
impl ScanCursor for PgScanCursor {
    async fn next_row(&mut self) -> Result<Option<PendingBuild>> {
        Ok(self.next().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_statement() {
        assert_eq!(
            fetch_statement(100),
            "FETCH FORWARD 100 FROM build_queue_scan"
        );
        assert_eq!(fetch_statement(0), "FETCH FORWARD 1 FROM build_queue_scan");
    }

    #[test]
    fn test_record_conversion() {
        let record = PendingBuildRecord {
            abi_tag: "cp35m".to_string(),
            package: "numpy".to_string(),
            version: "1.13.1".to_string(),
        };
        assert_eq!(
            PendingBuild::from(record),
            PendingBuild::new("cp35m", "numpy", "1.13.1")
        );
    }
}
