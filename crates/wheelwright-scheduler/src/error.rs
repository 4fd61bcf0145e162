//! Scheduler error types.

use thiserror::Error;
use wheelwright_reactor::ReactorError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("catalog scan failed: {0}")]
    Scan(#[source] wheelwright_core::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] wheelwright_core::Error),

    #[error(transparent)]
    Reactor(#[from] ReactorError),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
