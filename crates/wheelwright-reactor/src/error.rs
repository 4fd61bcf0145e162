//! Reactor error types.

use thiserror::Error;

use crate::ReactorState;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reactor is {actual}, expected {expected}")]
    InvalidState {
        actual: ReactorState,
        expected: ReactorState,
    },

    #[error("no request is awaiting a reply")]
    NoRequest,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("connection closed by peer")]
    Closed,

    #[error("task {task} failed: {source}")]
    Task {
        task: String,
        #[source]
        source: BoxError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReactorResult<T> = std::result::Result<T, ReactorError>;
