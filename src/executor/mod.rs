//! Job executors: the side that actually runs an upload.
//!
//! The dispatcher only ever talks to an executor through [`Executor`]:
//! - `start()` hands over a request and returns immediately with a handle
//! - `lookup()` finds a still-running job by handle
//! - `request_cancel()` asks a running job to stop
//!
//! Completion is reported asynchronously on the [`EventBus`](crate::events::EventBus),
//! never through a return value.

pub mod task;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::JobRequest;

pub use task::TaskExecutor;

/// Identifier of a job handed to an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(Uuid);

impl JobHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job the executor still considers running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJob {
    pub handle: JobHandle,
    pub started_at: DateTime<Utc>,
}

/// Runs upload jobs on behalf of the dispatcher.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Begin executing `request`. Must not wait for the job to finish.
    async fn start(&self, request: JobRequest) -> JobHandle;

    /// Find a job that is still running.
    async fn lookup(&self, handle: JobHandle) -> Option<RunningJob>;

    /// Ask a running job to stop. Cooperative: the job stops at its next
    /// suspension point.
    ///
    /// Returns `true` if the job was still running and will report nothing
    /// further. `false` means it already ended and its own terminal event is
    /// on the way.
    async fn request_cancel(&self, job: RunningJob) -> bool;
}
