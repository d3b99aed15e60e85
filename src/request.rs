//! Completion handles for operations that may run asynchronously.
//!
//! Callers pass [`Request::Immediate`] to ask for blocking execution. A backend
//! that finished synchronously marks the request [`Request::Complete`]; one that
//! still has work in flight leaves a [`Request::Pending`] handle to wait on.

use std::fmt;
use std::mem;

use crate::error::Result;

/// Deferred completion of an outstanding operation.
pub struct PendingRequest(Box<dyn FnOnce() -> Result<()> + Send>);

impl PendingRequest {
    /// Wraps the routine that blocks until the operation is done.
    pub fn new<F>(wait: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self(Box::new(wait))
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingRequest(..)")
    }
}

/// State of an operation's completion.
#[derive(Debug, Default)]
pub enum Request {
    /// Block until the operation completes.
    #[default]
    Immediate,
    /// The operation has completed.
    Complete,
    /// The operation is still running.
    Pending(PendingRequest),
}

impl Request {
    /// Whether nothing is left to wait for.
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }

    /// Marks synchronous completion.
    pub(crate) fn complete(&mut self) {
        *self = Self::Complete;
    }

    /// Blocks until the operation is done. A no-op unless pending.
    pub fn wait(&mut self) -> Result<()> {
        match mem::take(self) {
            Self::Pending(PendingRequest(wait)) => {
                let result = wait();
                *self = Self::Complete;
                result
            }
            other => {
                *self = other;
                Ok(())
            }
        }
    }
}
