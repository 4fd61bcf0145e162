//! The reactor loop.

use async_trait::async_trait;
use derive_more::Display;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Endpoint, ReactorError, ReactorResult};

/// Default bound on how long one iteration waits for input.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Lifecycle of a reactor. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ReactorState {
    #[display("init")]
    Init,
    #[display("running")]
    Running,
    #[display("stopping")]
    Stopping,
    #[display("stopped")]
    Stopped,
}

/// A component driven by a reactor.
#[async_trait]
pub trait Task: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &str;

    /// Called exactly once per iteration, whether or not any input arrived.
    /// An error stops the reactor.
    async fn tick(&mut self) -> Result<(), Self::Error>;
}

/// Handles one pending request on an endpoint. An error refuses the request
/// and disconnects the peer that sent it; the loop carries on.
pub type Handler<T> = fn(&mut T, &mut dyn Endpoint) -> ReactorResult<()>;

#[derive(Debug, Clone)]
pub struct ReactorOptions {
    /// Upper bound on the wait for input, and so on the gap between ticks
    /// while idle.
    pub poll_timeout: Duration,
}

impl Default for ReactorOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

struct Registration<T> {
    endpoint: Box<dyn Endpoint>,
    handler: Handler<T>,
}

/// Runs a [`Task`] and its endpoints until cancelled.
pub struct Reactor<T: Task> {
    task: T,
    registrations: Vec<Registration<T>>,
    options: ReactorOptions,
    shutdown: CancellationToken,
    state: ReactorState,
}

impl<T: Task> std::fmt::Debug for Reactor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("task", &self.task.name())
            .field("endpoints", &self.registrations.len())
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

impl<T: Task> Reactor<T> {
    pub fn new(task: T, options: ReactorOptions, shutdown: CancellationToken) -> Self {
        Self {
            task,
            registrations: Vec::new(),
            options,
            shutdown,
            state: ReactorState::Init,
        }
    }

    /// Bind a handler to an endpoint. Only allowed before [`run`](Self::run).
    /// When several endpoints are ready in one iteration their handlers run in
    /// registration order.
    pub fn register(
        &mut self,
        endpoint: impl Endpoint + 'static,
        handler: Handler<T>,
    ) -> ReactorResult<()> {
        self.expect_state(ReactorState::Init)?;
        debug!(task = %self.task.name(), endpoint = %endpoint.name(), "Endpoint registered");
        self.registrations.push(Registration {
            endpoint: Box::new(endpoint),
            handler,
        });
        Ok(())
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    /// A handle on the stop signal; cancelling it stops the loop at the next
    /// iteration boundary.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the stop signal is set or the task fails. Endpoints are
    /// released either way, and the reactor cannot be run again.
    pub async fn run(&mut self) -> ReactorResult<()> {
        self.expect_state(ReactorState::Init)?;
        self.state = ReactorState::Running;
        info!(
            task = %self.task.name(),
            endpoints = self.registrations.len(),
            poll_timeout_ms = self.options.poll_timeout.as_millis() as u64,
            "Reactor running"
        );

        let result = self.run_loop().await;

        self.state = ReactorState::Stopping;
        if let Err(e) = &result {
            error!(task = %self.task.name(), error = %e, "Reactor stopping after failure");
        }
        for registration in &mut self.registrations {
            registration.endpoint.close().await;
        }
        self.registrations.clear();
        self.state = ReactorState::Stopped;
        info!(task = %self.task.name(), "Reactor stopped");

        result
    }

    async fn run_loop(&mut self) -> ReactorResult<()> {
        loop {
            self.poll().await;

            for registration in &mut self.registrations {
                if !registration.endpoint.has_pending() {
                    continue;
                }
                let handled = (registration.handler)(&mut self.task, registration.endpoint.as_mut());
                if let Err(e) = handled {
                    warn!(
                        endpoint = %registration.endpoint.name(),
                        error = %e,
                        "Handler refused request"
                    );
                    registration.endpoint.reject();
                }
                registration.endpoint.flush().await;
            }

            if let Err(e) = self.task.tick().await {
                return Err(ReactorError::Task {
                    task: self.task.name().to_string(),
                    source: Box::new(e),
                });
            }

            if self.shutdown.is_cancelled() {
                return Ok(());
            }
        }
    }

    /// Wait until an endpoint has input, the poll timeout expires, or the stop
    /// signal is set.
    async fn poll(&mut self) {
        let timeout = tokio::time::sleep(self.options.poll_timeout);
        if self.registrations.is_empty() {
            tokio::select! {
                _ = timeout => {}
                _ = self.shutdown.cancelled() => {}
            }
            return;
        }

        let ready = futures::future::select_all(
            self.registrations
                .iter_mut()
                .map(|registration| registration.endpoint.readable()),
        );
        tokio::select! {
            _ = ready => {}
            _ = timeout => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    fn expect_state(&self, expected: ReactorState) -> ReactorResult<()> {
        if self.state != expected {
            return Err(ReactorError::InvalidState {
                actual: self.state,
                expected,
            });
        }
        Ok(())
    }
}
