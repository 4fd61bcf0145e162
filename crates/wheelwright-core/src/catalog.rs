//! Catalog accessor traits.
//!
//! The catalog is the persisted source of truth for which package versions
//! still need building. The build master only ever reads it through a
//! [`ScanCursor`]: one row at a time, in whatever order the catalog defines.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::{Error, PendingBuild, Result};

/// An in-flight catalog query, consumed one row at a time.
#[async_trait]
pub trait ScanCursor: Send {
    /// Pull the next row, or `None` once the query is exhausted.
    async fn next_row(&mut self) -> Result<Option<PendingBuild>>;
}

/// A queryable store of package/version build status.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Open a cursor over every build that is neither done nor skipped.
    async fn pending_builds(&self) -> Result<Box<dyn ScanCursor>>;
}

/// Catalog held in memory.
///
/// Clones share the same rows, so a test (or a dry run) can keep a handle and
/// change the backlog between scans. Each scan sees a snapshot taken when its
/// cursor was opened.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    rows: Arc<RwLock<Vec<PendingBuild>>>,
    fail_at: Arc<RwLock<Option<usize>>>,
    scans: Arc<AtomicUsize>,
}

impl MemoryCatalog {
    pub fn new(rows: Vec<PendingBuild>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            ..Self::default()
        }
    }

    /// Load rows from a JSON array of `{abi_tag, package, version}` objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<PendingBuild> = serde_json::from_str(json)?;
        Ok(Self::new(rows))
    }

    /// Replace the backlog seen by subsequent scans.
    pub fn set_rows(&self, rows: Vec<PendingBuild>) {
        *self.rows.write().unwrap_or_else(|e| e.into_inner()) = rows;
    }

    /// Make subsequent scans fail when they reach row `index`.
    pub fn fail_at(&self, index: Option<usize>) {
        *self.fail_at.write().unwrap_or_else(|e| e.into_inner()) = index;
    }

    /// Number of cursors opened so far.
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn pending_builds(&self) -> Result<Box<dyn ScanCursor>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner()).clone();
        let fail_at = *self.fail_at.read().unwrap_or_else(|e| e.into_inner());
        Ok(Box::new(MemoryCursor {
            rows: rows.into(),
            position: 0,
            fail_at,
        }))
    }
}

struct MemoryCursor {
    rows: VecDeque<PendingBuild>,
    position: usize,
    fail_at: Option<usize>,
}

#[async_trait]
impl ScanCursor for MemoryCursor {
    async fn next_row(&mut self) -> Result<Option<PendingBuild>> {
        if self.fail_at == Some(self.position) {
            return Err(Error::Catalog(format!(
                "connection lost at row {}",
                self.position
            )));
        }
        self.position += 1;
        Ok(self.rows.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(catalog: &MemoryCatalog) -> Result<Vec<PendingBuild>> {
        let mut cursor = catalog.pending_builds().await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[tokio::test]
    async fn test_cursor_yields_rows_in_order() {
        let catalog = MemoryCatalog::new(vec![
            PendingBuild::new("cp35m", "a", "1"),
            PendingBuild::new("cp34m", "b", "2"),
        ]);

        let rows = drain(&catalog).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].package, "a");
        assert_eq!(rows[1].abi_tag, "cp34m");
        assert_eq!(catalog.scans(), 1);
    }

    #[tokio::test]
    async fn test_cursor_is_a_snapshot() {
        let catalog = MemoryCatalog::new(vec![PendingBuild::new("cp35m", "a", "1")]);
        let mut cursor = catalog.pending_builds().await.unwrap();
        catalog.set_rows(Vec::new());

        assert!(cursor.next_row().await.unwrap().is_some());
        assert!(cursor.next_row().await.unwrap().is_none());
        assert!(drain(&catalog).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_failure() {
        let catalog = MemoryCatalog::new(vec![
            PendingBuild::new("cp35m", "a", "1"),
            PendingBuild::new("cp35m", "b", "1"),
        ]);
        catalog.fail_at(Some(1));

        let result = drain(&catalog).await;
        assert!(matches!(result, Err(Error::Catalog(_))));
    }

    #[test]
    fn test_from_json() {
        let catalog = MemoryCatalog::from_json(
            r#"[{"abi_tag": "cp35m", "package": "numpy", "version": "1.13.1"}]"#,
        )
        .unwrap();
        assert_eq!(catalog.rows.read().unwrap().len(), 1);

        assert!(MemoryCatalog::from_json("{").is_err());
    }
}
