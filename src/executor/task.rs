//! Executor that runs each upload as a tokio task.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{Executor, JobHandle, RunningJob};
use crate::events::{EventBus, UploadEvent, UploadStatus};
use crate::request::JobRequest;
use crate::transport::Transport;

/// Registry entry for a spawned upload.
#[derive(Debug)]
struct TrackedJob {
    started_at: DateTime<Utc>,
    abort: AbortHandle,
}

/// Spawns one task per job, driving it through a [`Transport`].
///
/// The task publishes `Started`, then `Finished` or `Error` for its handle.
/// A cancelled task publishes nothing further.
pub struct TaskExecutor {
    transport: Arc<dyn Transport>,
    bus: EventBus,
    running: Arc<RwLock<HashMap<JobHandle, TrackedJob>>>,
}

impl TaskExecutor {
    pub fn new(transport: Arc<dyn Transport>, bus: EventBus) -> Self {
        Self {
            transport,
            bus,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of jobs currently registered as running.
    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }
}

#[async_trait]
impl Executor for TaskExecutor {
    async fn start(&self, request: JobRequest) -> JobHandle {
        let handle = JobHandle::new();
        let transport = Arc::clone(&self.transport);
        let bus = self.bus.clone();
        let registry = Arc::clone(&self.running);

        // Hold the registry lock across spawn + insert so the task cannot
        // deregister itself before it has been registered.
        let mut running = self.running.write().await;

        let task = tokio::spawn(async move {
            bus.publish(UploadEvent::new(UploadStatus::Started).for_job(handle));

            let result = transport.send(&request).await;

            // Whoever removes the entry owns the outcome. If a cancel got there
            // first the dispatcher has already reported this job.
            if registry.write().await.remove(&handle).is_none() {
                debug!(job = %handle, "Upload completed after cancellation, not reporting");
                return;
            }

            match result {
                Ok(()) => {
                    info!(job = %handle, transport = request.transport_name(), "Upload finished");
                    bus.publish(UploadEvent::new(UploadStatus::Finished).for_job(handle));
                }
                Err(e) => {
                    warn!(job = %handle, error = %e, "Upload failed");
                    bus.publish(
                        UploadEvent::new(UploadStatus::Error)
                            .for_job(handle)
                            .with_detail(e.to_string()),
                    );
                }
            }
        });

        running.insert(
            handle,
            TrackedJob {
                started_at: Utc::now(),
                abort: task.abort_handle(),
            },
        );

        debug!(job = %handle, "Spawned upload task");
        handle
    }

    async fn lookup(&self, handle: JobHandle) -> Option<RunningJob> {
        self.running
            .read()
            .await
            .get(&handle)
            .map(|tracked| RunningJob {
                handle,
                started_at: tracked.started_at,
            })
    }

    async fn request_cancel(&self, job: RunningJob) -> bool {
        let removed = self.running.write().await.remove(&job.handle);
        match removed {
            Some(tracked) => {
                tracked.abort.abort();
                info!(job = %job.handle, "Upload task cancelled");
                true
            }
            None => {
                debug!(job = %job.handle, "Upload ended before cancellation took effect");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Notify;
    use tokio::time::timeout;

    use super::*;
    use crate::error::TransferError;
    use crate::request::ReviewMode;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Succeeds immediately.
    struct OkTransport;

    #[async_trait]
    impl Transport for OkTransport {
        async fn send(&self, _request: &JobRequest) -> Result<(), TransferError> {
            Ok(())
        }
    }

    /// Fails immediately.
    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _request: &JobRequest) -> Result<(), TransferError> {
            Err(TransferError::Closed)
        }
    }

    /// Blocks until released.
    struct GatedTransport(Arc<Notify>);

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _request: &JobRequest) -> Result<(), TransferError> {
            self.0.notified().await;
            Ok(())
        }
    }

    fn request() -> JobRequest {
        JobRequest::hotspot(vec![1, 2, 3], 8998, ReviewMode(0))
    }

    #[tokio::test]
    async fn successful_job_reports_started_then_finished() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let executor = TaskExecutor::new(Arc::new(OkTransport), bus);

        let handle = executor.start(request()).await;

        let started = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(started.status, UploadStatus::Started);
        assert_eq!(started.job, Some(handle));

        let finished = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(finished.status, UploadStatus::Finished);
        assert_eq!(finished.job, Some(handle));

        assert!(executor.lookup(handle).await.is_none());
        assert_eq!(executor.running_count().await, 0);
    }

    #[tokio::test]
    async fn failed_job_reports_error_with_detail() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let executor = TaskExecutor::new(Arc::new(FailingTransport), bus);

        let handle = executor.start(request()).await;

        let _started = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        let error = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(error.status, UploadStatus::Error);
        assert_eq!(error.job, Some(handle));
        assert!(error.detail.unwrap().contains("closed"));
    }

    #[tokio::test]
    async fn cancelled_job_publishes_nothing_further() {
        let gate = Arc::new(Notify::new());
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let executor = TaskExecutor::new(Arc::new(GatedTransport(Arc::clone(&gate))), bus);

        let handle = executor.start(request()).await;
        let started = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(started.status, UploadStatus::Started);

        let running = executor.lookup(handle).await.expect("job should be running");
        assert_eq!(running.handle, handle);
        assert!(executor.request_cancel(running).await);

        assert!(executor.lookup(handle).await.is_none());

        // Releasing the gate must not produce a Finished event.
        gate.notify_waiters();
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    /// Signals once the transfer is underway, then blocks the worker thread
    /// so the task cannot be interrupted before it completes.
    struct BlockingTransport {
        entered: Arc<Notify>,
        hold: Duration,
    }

    #[async_trait]
    impl Transport for BlockingTransport {
        async fn send(&self, _request: &JobRequest) -> Result<(), TransferError> {
            self.entered.notify_one();
            std::thread::sleep(self.hold);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transfer_completing_after_cancel_is_not_reported() {
        let entered = Arc::new(Notify::new());
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let transport = BlockingTransport {
            entered: Arc::clone(&entered),
            hold: Duration::from_millis(150),
        };
        let executor = TaskExecutor::new(Arc::new(transport), bus);

        let handle = executor.start(request()).await;
        timeout(TEST_TIMEOUT, entered.notified()).await.unwrap();

        let running = executor.lookup(handle).await.expect("job should be running");
        assert!(executor.request_cancel(running).await);

        let mut seen = Vec::new();
        while let Ok(Ok(event)) = timeout(Duration::from_millis(400), rx.recv()).await {
            seen.push(event.status);
        }
        assert_eq!(seen, vec![UploadStatus::Started]);
    }

    #[tokio::test]
    async fn cancel_after_completion_reports_miss() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let executor = TaskExecutor::new(Arc::new(OkTransport), bus);

        let handle = executor.start(request()).await;
        let running = executor.lookup(handle).await.expect("job should be registered");

        let _started = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        let finished = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(finished.status, UploadStatus::Finished);

        assert!(!executor.request_cancel(running).await);
    }

    #[tokio::test]
    async fn lookup_of_unknown_handle_misses() {
        let executor = TaskExecutor::new(Arc::new(OkTransport), EventBus::default());
        assert!(executor.lookup(JobHandle::new()).await.is_none());
    }
}
