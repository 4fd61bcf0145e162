//! Catalog scan bookkeeping.

use std::time::Duration;
use tokio::time::Instant;
use wheelwright_core::{PendingBuild, Result, ScanCursor};

/// Tracks the one catalog scan that may be in flight and when the last one
/// finished.
///
/// A new scan may only start once no cursor is open and `cooldown` has passed
/// since the previous scan *completed*, so a slow scan never shortens the gap
/// before the next one.
pub struct ScanState {
    cursor: Option<Box<dyn ScanCursor>>,
    last_completed: Option<Instant>,
    cooldown: Duration,
}

impl std::fmt::Debug for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanState")
            .field("active", &self.is_active())
            .field("last_completed", &self.last_completed)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl ScanState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cursor: None,
            last_completed: None,
            cooldown,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cursor.is_some()
    }

    /// Whether a scan may start at `now`. Always true before the first scan
    /// has completed.
    pub fn can_start(&self, now: Instant) -> bool {
        self.cursor.is_none()
            && self
                .last_completed
                .is_none_or(|done| now.saturating_duration_since(done) >= self.cooldown)
    }

    pub fn begin(&mut self, cursor: Box<dyn ScanCursor>) {
        self.cursor = Some(cursor);
    }

    /// Pull the next row from the open cursor. `Ok(None)` means exhausted,
    /// or that no scan is open.
    pub async fn next_row(&mut self) -> Result<Option<PendingBuild>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.next_row().await,
            None => Ok(None),
        }
    }

    /// The cursor ran dry at `now`; the cooldown starts counting from here.
    pub fn finish(&mut self, now: Instant) {
        self.cursor = None;
        self.last_completed = Some(now);
    }

    /// Throw away a failed scan. The completion time is left alone, so the
    /// next attempt is gated exactly as if the failed scan never started.
    pub fn abandon(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelwright_core::{Catalog, MemoryCatalog};

    #[tokio::test]
    async fn test_cooldown_from_completion() {
        let catalog = MemoryCatalog::default();
        let mut scan = ScanState::new(Duration::from_secs(30));
        let t0 = Instant::now();

        assert!(scan.can_start(t0));
        scan.begin(catalog.pending_builds().await.unwrap());
        assert!(scan.is_active());
        assert!(!scan.can_start(t0 + Duration::from_secs(60)));

        assert!(scan.next_row().await.unwrap().is_none());
        scan.finish(t0);

        assert!(!scan.can_start(t0 + Duration::from_secs(10)));
        assert!(!scan.can_start(t0 + Duration::from_secs(29)));
        assert!(scan.can_start(t0 + Duration::from_secs(30)));
        assert!(scan.can_start(t0 + Duration::from_secs(31)));
    }

    #[tokio::test]
    async fn test_abandon_keeps_last_completion() {
        let catalog = MemoryCatalog::default();
        let mut scan = ScanState::new(Duration::from_secs(30));
        let t0 = Instant::now();
        scan.finish(t0);

        scan.begin(catalog.pending_builds().await.unwrap());
        scan.abandon();

        assert!(!scan.is_active());
        assert!(!scan.can_start(t0 + Duration::from_secs(5)));
        assert!(scan.can_start(t0 + Duration::from_secs(30)));
    }
}
