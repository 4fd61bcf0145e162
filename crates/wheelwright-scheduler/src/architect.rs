//! The architect: turns the catalog backlog into per-ABI build queues.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use wheelwright_core::protocol::{self, WorkReply};
use wheelwright_core::{Catalog, PendingBuild};
use wheelwright_reactor::{
    CancellationToken, Endpoint, Reactor, ReactorError, ReactorOptions, ReactorResult, Task,
};

use crate::{BoundedQueue, ScanState, SchedulerError, SchedulerResult};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct ArchitectConfig {
    /// Minimum gap between the end of one catalog scan and the start of the
    /// next.
    pub cooldown: Duration,
    /// Maximum number of queued builds per ABI.
    pub queue_capacity: usize,
}

impl Default for ArchitectConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Snapshot of the architect's state for the admin surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectStats {
    pub scanning: bool,
    pub scans_completed: u64,
    pub last_scan_at: Option<DateTime<Utc>>,
    /// Queue length per ABI tag.
    pub queued: BTreeMap<String, usize>,
    pub served: u64,
    pub evicted: u64,
}

/// Maintains the per-ABI backlogs and serves them on demand.
///
/// Each tick either starts a catalog scan (once the cooldown allows) or pulls
/// exactly one row from the scan in progress, so a large catalog never stalls
/// the reactor for more than a single row fetch. Requests are answered from
/// the queues immediately; an empty or unknown ABI gets the no-work marker.
pub struct Architect {
    catalog: Arc<dyn Catalog>,
    queues: HashMap<String, BoundedQueue<PendingBuild>>,
    scan: ScanState,
    queue_capacity: usize,
    rows_scanned: u64,
    scans_completed: u64,
    last_scan_at: Option<DateTime<Utc>>,
    served: u64,
    evicted: u64,
}

impl std::fmt::Debug for Architect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Architect")
            .field("catalog", &self.catalog.name())
            .field("abis", &self.queues.len())
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl Architect {
    pub fn new(catalog: Arc<dyn Catalog>, config: ArchitectConfig) -> Self {
        Self {
            catalog,
            queues: HashMap::new(),
            scan: ScanState::new(config.cooldown),
            queue_capacity: config.queue_capacity,
            rows_scanned: 0,
            scans_completed: 0,
            last_scan_at: None,
            served: 0,
            evicted: 0,
        }
    }

    /// Build a reactor driving this architect with `build_queue` answering
    /// work requests.
    pub fn into_reactor(
        self,
        build_queue: impl Endpoint + 'static,
        options: ReactorOptions,
        shutdown: CancellationToken,
    ) -> ReactorResult<Reactor<Self>> {
        let mut reactor = Reactor::new(self, options, shutdown);
        reactor.register(build_queue, handle_build)?;
        Ok(reactor)
    }

    /// One tick at `now`: start a scan if allowed, or advance the current one
    /// by a single row.
    ///
    /// A catalog failure abandons the scan and is returned to the caller; the
    /// rows already queued stay where they are.
    pub async fn step(&mut self, now: Instant) -> SchedulerResult<()> {
        if !self.scan.is_active() {
            if self.scan.can_start(now) {
                debug!(catalog = self.catalog.name(), "Starting build queue scan");
                let cursor = self
                    .catalog
                    .pending_builds()
                    .await
                    .map_err(SchedulerError::Scan)?;
                self.scan.begin(cursor);
                self.rows_scanned = 0;
            }
            return Ok(());
        }

        match self.scan.next_row().await {
            Ok(Some(build)) => {
                self.rows_scanned += 1;
                self.enqueue(build);
            }
            Ok(None) => {
                self.scan.finish(now);
                self.scans_completed += 1;
                self.last_scan_at = Some(Utc::now());
                info!(
                    rows = self.rows_scanned,
                    abis = self.queues.len(),
                    queued = self.queues.values().map(BoundedQueue::len).sum::<usize>(),
                    evicted = self.evicted,
                    "Build queue scan complete"
                );
            }
            Err(e) => {
                self.scan.abandon();
                warn!(rows = self.rows_scanned, error = %e, "Build queue scan abandoned");
                return Err(SchedulerError::Scan(e));
            }
        }
        Ok(())
    }

    /// Append a build to the queue for its ABI, evicting that queue's oldest
    /// entry if it is full.
    pub fn enqueue(&mut self, build: PendingBuild) {
        let capacity = self.queue_capacity;
        let queue = self
            .queues
            .entry(build.abi_tag.clone())
            .or_insert_with(|| BoundedQueue::new(capacity));
        if let Some(evicted) = queue.push(build) {
            self.evicted += 1;
            trace!(
                abi_tag = %evicted.abi_tag,
                package = %evicted.package,
                version = %evicted.version,
                "Evicted queued build"
            );
        }
    }

    /// Take the oldest queued build for `abi_tag`. Never waits; `None` is the
    /// no-work marker and leaves all state untouched.
    pub fn request(&mut self, abi_tag: &str) -> WorkReply {
        let build = self.queues.get_mut(abi_tag)?.pop()?;
        self.served += 1;
        debug!(
            abi_tag,
            package = %build.package,
            version = %build.version,
            "Dispatched build"
        );
        Some(build.into())
    }

    /// Number of builds queued for `abi_tag`.
    pub fn queued(&self, abi_tag: &str) -> usize {
        self.queues.get(abi_tag).map_or(0, BoundedQueue::len)
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_active()
    }

    pub fn stats(&self) -> ArchitectStats {
        ArchitectStats {
            scanning: self.scan.is_active(),
            scans_completed: self.scans_completed,
            last_scan_at: self.last_scan_at,
            queued: self
                .queues
                .iter()
                .map(|(abi, queue)| (abi.clone(), queue.len()))
                .collect(),
            served: self.served,
            evicted: self.evicted,
        }
    }
}

#[async_trait]
impl Task for Architect {
    type Error = SchedulerError;

    fn name(&self) -> &str {
        "architect"
    }

    async fn tick(&mut self) -> SchedulerResult<()> {
        self.step(Instant::now()).await
    }
}

/// Answer one work request: the payload is an ABI tag, the reply a
/// `[package, version]` pair or `null`. A malformed request is refused before
/// any queue is touched.
pub fn handle_build(architect: &mut Architect, endpoint: &mut dyn Endpoint) -> ReactorResult<()> {
    let Some(payload) = endpoint.recv() else {
        return Ok(());
    };
    let abi_tag = protocol::decode_request(&payload)
        .map_err(|e| ReactorError::Malformed(e.to_string()))?;

    let reply = architect.request(&abi_tag);
    if reply.is_none() {
        trace!(abi_tag = %abi_tag, "No work queued");
    }
    let payload =
        protocol::encode_reply(&reply).map_err(|e| ReactorError::Malformed(e.to_string()))?;
    endpoint.send(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelwright_core::{BuildJob, MemoryCatalog};
    use wheelwright_reactor::ReplySocket;

    fn architect(catalog: &MemoryCatalog, capacity: usize) -> Architect {
        Architect::new(
            Arc::new(catalog.clone()),
            ArchitectConfig {
                cooldown: Duration::from_secs(30),
                queue_capacity: capacity,
            },
        )
    }

    fn job(package: &str, version: &str) -> WorkReply {
        Some(BuildJob::new(package, version))
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut arch = architect(&MemoryCatalog::default(), 2);
        for version in ["1", "2", "3"] {
            arch.enqueue(PendingBuild::new("cp35m", "pkgA", version));
        }

        assert_eq!(arch.queued("cp35m"), 2);
        assert_eq!(arch.request("cp35m"), job("pkgA", "2"));
        assert_eq!(arch.request("cp35m"), job("pkgA", "3"));
        assert_eq!(arch.request("cp35m"), None);

        let stats = arch.stats();
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.served, 2);
    }

    #[test]
    fn test_overflow_keeps_most_recent_in_order() {
        let mut arch = architect(&MemoryCatalog::default(), 5);
        for i in 0..12 {
            arch.enqueue(PendingBuild::new("cp34m", "pkg", i.to_string()));
        }

        let served: Vec<_> = std::iter::from_fn(|| arch.request("cp34m"))
            .map(|job| job.version)
            .collect();
        assert_eq!(served, vec!["7", "8", "9", "10", "11"]);
    }

    #[test]
    fn test_queues_are_per_abi_fifo() {
        let mut arch = architect(&MemoryCatalog::default(), 10);
        arch.enqueue(PendingBuild::new("cp35m", "a", "1"));
        arch.enqueue(PendingBuild::new("cp34m", "b", "1"));
        arch.enqueue(PendingBuild::new("cp35m", "c", "1"));

        assert_eq!(arch.request("cp34m"), job("b", "1"));
        assert_eq!(arch.request("cp34m"), None);
        assert_eq!(arch.request("cp35m"), job("a", "1"));
        assert_eq!(arch.request("cp35m"), job("c", "1"));
    }

    #[test]
    fn test_empty_and_unknown_requests_change_nothing() {
        let mut arch = architect(&MemoryCatalog::default(), 10);
        let before = arch.stats();

        for _ in 0..3 {
            assert_eq!(arch.request("cp35m"), None);
            assert_eq!(arch.request("never-seen"), None);
        }

        assert_eq!(arch.stats(), before);
        assert!(arch.stats().queued.is_empty());
    }

    #[tokio::test]
    async fn test_scan_pulls_one_row_per_tick() {
        let catalog = MemoryCatalog::new(vec![
            PendingBuild::new("cp35m", "a", "1"),
            PendingBuild::new("cp34m", "b", "1"),
            PendingBuild::new("cp35m", "c", "2"),
        ]);
        let mut arch = architect(&catalog, 10);
        let now = Instant::now();

        arch.step(now).await.unwrap();
        assert!(arch.is_scanning());
        assert_eq!(arch.stats().queued.values().sum::<usize>(), 0);

        arch.step(now).await.unwrap();
        assert_eq!(arch.queued("cp35m"), 1);
        // Requests are served while the scan is still running.
        assert_eq!(arch.request("cp35m"), job("a", "1"));

        arch.step(now).await.unwrap();
        assert_eq!(arch.queued("cp34m"), 1);
        arch.step(now).await.unwrap();
        assert_eq!(arch.queued("cp35m"), 1);
        assert!(arch.is_scanning());

        arch.step(now).await.unwrap();
        assert!(!arch.is_scanning());
        let stats = arch.stats();
        assert_eq!(stats.scans_completed, 1);
        assert!(stats.last_scan_at.is_some());
        assert_eq!(catalog.scans(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_gates_next_scan() {
        let catalog = MemoryCatalog::default();
        let mut arch = architect(&catalog, 10);
        let t0 = Instant::now();

        // Empty scan: start, then exhaust at t0.
        arch.step(t0).await.unwrap();
        arch.step(t0).await.unwrap();
        assert!(!arch.is_scanning());
        assert_eq!(catalog.scans(), 1);

        catalog.set_rows(vec![PendingBuild::new("cp35m", "a", "1")]);
        arch.step(t0 + Duration::from_secs(10)).await.unwrap();
        assert!(!arch.is_scanning());
        assert_eq!(catalog.scans(), 1);
        assert_eq!(arch.queued("cp35m"), 0);

        arch.step(t0 + Duration::from_secs(31)).await.unwrap();
        assert!(arch.is_scanning());
        assert_eq!(catalog.scans(), 2);
    }

    #[tokio::test]
    async fn test_cooldown_counts_from_completion() {
        let catalog = MemoryCatalog::new(vec![PendingBuild::new("cp35m", "a", "1")]);
        let mut arch = architect(&catalog, 10);
        let t0 = Instant::now();

        arch.step(t0).await.unwrap();
        arch.step(t0 + Duration::from_secs(20)).await.unwrap();
        arch.step(t0 + Duration::from_secs(40)).await.unwrap();
        assert!(!arch.is_scanning());

        // 45s after the start, but only 5s after completion.
        arch.step(t0 + Duration::from_secs(45)).await.unwrap();
        assert!(!arch.is_scanning());
        arch.step(t0 + Duration::from_secs(70)).await.unwrap();
        assert!(arch.is_scanning());
    }

    #[tokio::test]
    async fn test_catalog_failure_abandons_scan() {
        let catalog = MemoryCatalog::new(vec![
            PendingBuild::new("cp35m", "a", "1"),
            PendingBuild::new("cp35m", "b", "1"),
        ]);
        catalog.fail_at(Some(1));
        let mut arch = architect(&catalog, 10);
        let now = Instant::now();

        arch.step(now).await.unwrap();
        arch.step(now).await.unwrap();
        let err = arch.step(now).await.unwrap_err();

        assert!(matches!(err, SchedulerError::Scan(_)));
        assert!(!arch.is_scanning());
        assert_eq!(arch.queued("cp35m"), 1);
        assert_eq!(arch.stats().scans_completed, 0);

        // No scan has completed yet, so a retry may start straight away.
        catalog.fail_at(None);
        arch.step(now).await.unwrap();
        assert!(arch.is_scanning());
        assert_eq!(catalog.scans(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_failure_stops_reactor() {
        let catalog = MemoryCatalog::new(vec![PendingBuild::new("cp35m", "a", "1")]);
        catalog.fail_at(Some(0));
        let socket = ReplySocket::bind("build-queue", "127.0.0.1:0").await.unwrap();

        let mut reactor = architect(&catalog, 10)
            .into_reactor(socket, ReactorOptions::default(), CancellationToken::new())
            .unwrap();
        let err = reactor.run().await.unwrap_err();

        assert!(matches!(err, ReactorError::Task { .. }));
        assert!(!reactor.task().is_scanning());
    }
}
