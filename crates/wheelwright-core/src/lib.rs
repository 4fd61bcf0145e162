//! Core domain types and traits for the wheelwright build master.
//!
//! This crate contains:
//! - Pending build rows and the jobs handed to workers
//! - The catalog accessor traits (`Catalog`, `ScanCursor`)
//! - An in-memory catalog
//! - The build queue request/reply wire format

pub mod catalog;
pub mod error;
pub mod job;
pub mod protocol;

pub use catalog::{Catalog, MemoryCatalog, ScanCursor};
pub use error::{Error, Result};
pub use job::{BuildJob, PendingBuild};
