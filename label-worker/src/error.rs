//! Worker error taxonomy
//!
//! One umbrella over the per-module errors. Everything here is recovered
//! at unit or job granularity; nothing crashes the loop. The only error
//! that escapes a job is a write-back that exhausted its retries, and the
//! loop catches that too.

use thiserror::Error;

use crate::counters::CounterError;
use crate::dispatch::DispatchError;
use crate::journal::JournalError;
use crate::render::RenderError;
use crate::source::SourceError;

/// Errors surfaced while processing jobs
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Local counter files unreadable or unwritable
    #[error(transparent)]
    Counter(#[from] CounterError),

    /// Journal append failed
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Remote job source unreachable or rejecting requests
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Template resolution or payload composition failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A unit exhausted its dispatch attempts
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;
