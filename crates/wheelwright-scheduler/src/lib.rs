//! Build queue scheduling for the wheelwright build master.
//!
//! The [`Architect`] scans the catalog for pending builds one row per reactor
//! tick, sorts them into bounded per-ABI queues, and answers each worker's
//! request for work with the oldest queued build for its ABI.

pub mod architect;
pub mod client;
pub mod error;
pub mod queue;
pub mod scan;

pub use architect::{Architect, ArchitectConfig, ArchitectStats, handle_build};
pub use client::BuildQueueClient;
pub use error::{SchedulerError, SchedulerResult};
pub use queue::BoundedQueue;
pub use scan::ScanState;
