//! Single-flight dispatch state machine.
//!
//! ```text
//!            submit                     submit (enqueue)
//!   IDLE ─────────────▶ BUSY ◀──────────────┐
//!    ▲                   │ │                │
//!    │ FINISHED, queue   │ └────────────────┘
//!    │ empty / ERROR /   │ FINISHED, queue non-empty
//!    │ CANCELLED         │ (start next)
//!    └───────────────────┘
//! ```
//!
//! ERROR and CANCELLED discard the whole queue, not just the failed job.
//!
//! There is no timeout: a job whose executor never reports a terminal status
//! keeps the dispatcher BUSY and everything behind it queued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::events::{EventBus, UploadEvent, UploadStatus};
use crate::executor::{Executor, JobHandle};
use crate::queue::JobQueue;
use crate::request::JobRequest;

/// Coarse dispatcher state, derived from whether a job is in flight.
///
/// `Idle` normally also means the queue is empty. The exception is a cancel
/// whose job had already ended: nothing is in flight, yet the queue is kept
/// until that job's own terminal event arrives. A submit in that window starts
/// immediately, so it is reported as `Idle` with `queued` non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    Busy,
}

/// The job currently handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentJob {
    pub handle: JobHandle,
    pub request: JobRequest,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStatus {
    pub state: DispatchState,
    pub current: Option<CurrentJob>,
    /// Pending requests in dispatch order.
    pub queued: Vec<JobRequest>,
}

/// Result of [`Dispatcher::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Nothing was in flight; the request went straight to the executor.
    Started { job: JobHandle },
    /// Another job is in flight; the request waits at `position` (1-based).
    Queued { position: usize },
}

/// Result of [`Dispatcher::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Nothing was in flight.
    Idle,
    /// The executor stopped the job; a CANCELLED event was published.
    Cancelled { job: JobHandle },
    /// The job had already ended; the reference was dropped and the job's own
    /// terminal event decides what happens to the queue.
    NotFound { job: JobHandle },
}

/// What an event did to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Non-terminal status; no change.
    Ignored,
    /// Terminal status for a job other than the one in flight; no change.
    Stale,
    /// FINISHED with work queued: the next job was started.
    Advanced { job: JobHandle },
    /// FINISHED with nothing queued: now idle.
    Drained,
    /// ERROR or CANCELLED: queue discarded, now idle.
    Reset { discarded: usize },
}

/// Owns the queue and the in-flight job. Not synchronized: drive it from a
/// single task (see [`DispatcherService`](super::DispatcherService)).
pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    bus: EventBus,
    queue: JobQueue,
    current: Option<CurrentJob>,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn Executor>, bus: EventBus) -> Self {
        Self {
            executor,
            bus,
            queue: JobQueue::new(),
            current: None,
        }
    }

    /// Start `request` now if idle, otherwise queue it behind the others.
    pub async fn submit(&mut self, request: JobRequest) -> SubmitOutcome {
        if self.current.is_some() {
            self.queue.enqueue(request);
            let position = self.queue.len();
            debug!(position, "Upload queued behind in-flight job");
            SubmitOutcome::Queued { position }
        } else {
            SubmitOutcome::Started {
                job: self.start(request).await,
            }
        }
    }

    /// Cancel the in-flight job, if any. Queued jobs cannot be cancelled
    /// individually; a confirmed cancellation discards them all.
    pub async fn cancel(&mut self) -> CancelOutcome {
        let Some(current) = self.current.take() else {
            return CancelOutcome::Idle;
        };
        let job = current.handle;

        let Some(running) = self.executor.lookup(job).await else {
            error!(job = %job, "Pending job not found in executor, dropping it");
            return CancelOutcome::NotFound { job };
        };

        if !self.executor.request_cancel(running).await {
            // Ended between lookup and cancel; its own terminal event follows.
            info!(job = %job, "Upload ended before it could be cancelled, dropping it");
            return CancelOutcome::NotFound { job };
        }

        let discarded = self.queue.clear();
        info!(job = %job, discarded, "Upload job cancelled");
        self.bus
            .publish(UploadEvent::new(UploadStatus::Cancelled).for_job(job));
        CancelOutcome::Cancelled { job }
    }

    /// Apply one upload event.
    pub async fn handle_event(&mut self, event: &UploadEvent) -> Transition {
        match event.status {
            status if !status.is_terminal() => Transition::Ignored,
            _ if self.is_stale(event) => {
                debug!(
                    job = ?event.job,
                    status = %event.status,
                    "Ignoring terminal event for a job that is no longer in flight"
                );
                Transition::Stale
            }
            UploadStatus::Error | UploadStatus::Cancelled => {
                let discarded = self.reset();
                info!(
                    status = %event.status,
                    detail = event.detail.as_deref().unwrap_or(""),
                    discarded,
                    "Upload ended abnormally, pending uploads discarded"
                );
                Transition::Reset { discarded }
            }
            UploadStatus::Finished => match self.queue.dequeue_next() {
                Some(next) => Transition::Advanced {
                    job: self.start(next).await,
                },
                None => {
                    self.current = None;
                    debug!("Upload queue drained");
                    Transition::Drained
                }
            },
            UploadStatus::Started | UploadStatus::Progress => Transition::Ignored,
        }
    }

    pub fn state(&self) -> DispatchState {
        if self.current.is_some() {
            DispatchState::Busy
        } else {
            DispatchState::Idle
        }
    }

    pub fn current(&self) -> Option<&CurrentJob> {
        self.current.as_ref()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            state: self.state(),
            current: self.current.clone(),
            queued: self.queue.iter().cloned().collect(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    async fn start(&mut self, request: JobRequest) -> JobHandle {
        let handle = self.executor.start(request.clone()).await;
        info!(
            job = %handle,
            transport = request.transport_name(),
            instances = request.instances().len(),
            "Starting upload job"
        );
        self.current = Some(CurrentJob {
            handle,
            request,
            started_at: Utc::now(),
        });
        handle
    }

    fn reset(&mut self) -> usize {
        self.current = None;
        self.queue.clear()
    }

    /// An event is stale when it names a job other than the one in flight.
    fn is_stale(&self, event: &UploadEvent) -> bool {
        match (event.job, &self.current) {
            (Some(job), Some(current)) => job != current.handle,
            _ => false,
        }
    }
}
