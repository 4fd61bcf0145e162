//! Single-threaded cooperative task runtime.
//!
//! A [`Reactor`] owns one [`Task`] and any number of request/reply
//! [`Endpoint`]s. Each iteration it waits a bounded time for input, runs the
//! handler of every endpoint holding a request, ticks the task once and then
//! checks its cancellation token. Nothing blocks except that bounded wait, so
//! handlers and ticks must return quickly.

pub mod endpoint;
pub mod error;
pub mod reactor;

pub use endpoint::{DEFAULT_WRITE_TIMEOUT, Endpoint, ReplySocket, RequestSocket};
pub use error::{BoxError, ReactorError, ReactorResult};
pub use reactor::{DEFAULT_POLL_TIMEOUT, Handler, Reactor, ReactorOptions, ReactorState, Task};
pub use tokio_util::sync::CancellationToken;
