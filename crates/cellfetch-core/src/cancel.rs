//! Cancellation for in-flight fetches.
//!
//! A `CancellationToken` is the shared flag observed by the worker that runs a
//! fetch; a `CancelHandle` is what the caller holds. Cancelling the handle sets
//! the flag (so the worker never invokes its completion) and aborts the worker
//! task, which drops the transport future and releases its connection.

use crate::error::CellFetchError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Shared cancellation flag checked by a fetch worker before it completes.
///
/// ```
/// use cellfetch::cancel::CancellationToken;
///
/// let caller = CancellationToken::new();
/// let worker = caller.clone();
///
/// caller.cancel();
/// assert!(worker.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(CancelledError)` once cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        match self.is_cancelled() {
            true => Err(CancelledError),
            false => Ok(()),
        }
    }
}

/// A fetch was cancelled before its outcome was handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fetch cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for CellFetchError {
    fn from(_: CancelledError) -> Self {
        CellFetchError::Cancelled
    }
}

/// Caller-side handle for a fetch running on a worker task.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
    abort: Option<AbortHandle>,
}

impl CancelHandle {
    pub(crate) fn new(token: CancellationToken, abort: AbortHandle) -> Self {
        Self {
            token,
            abort: Some(abort),
        }
    }

    /// A handle with no worker attached, cancelling only the token.
    pub fn detached(token: CancellationToken) -> Self {
        Self { token, abort: None }
    }

    /// Cancel the fetch. Idempotent.
    ///
    /// No completion is invoked after this returns unless the worker had
    /// already started invoking it.
    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the worker task has stopped, either by finishing or by abort.
    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().map_or(true, AbortHandle::is_finished)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
