//! Shared harness: the real dispatcher stack driven by a scripted transport.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use share_sender::dispatcher::{
    DEFAULT_COMMAND_CAPACITY, Dispatcher, DispatcherHandle, DispatcherService, DispatcherStatus,
};
use share_sender::error::TransferError;
use share_sender::events::{DEFAULT_EVENT_CAPACITY, EventBus, UploadEvent, UploadStatus};
use share_sender::executor::TaskExecutor;
use share_sender::request::JobRequest;
use share_sender::transport::Transport;

/// Maximum time any wait is allowed before we consider the test hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A transfer the executor is waiting on. Complete it to end the job.
pub struct PendingTransfer {
    pub request: JobRequest,
    pub complete: oneshot::Sender<Result<(), TransferError>>,
}

impl PendingTransfer {
    pub fn succeed(self) {
        let _ = self.complete.send(Ok(()));
    }

    pub fn fail(self, reply: &str) {
        let _ = self.complete.send(Err(TransferError::Rejected {
            reply: reply.to_string(),
        }));
    }
}

/// Hands every transfer to the test and waits for the test's verdict.
struct ScriptedTransport {
    transfers: mpsc::UnboundedSender<PendingTransfer>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &JobRequest) -> Result<(), TransferError> {
        let (complete, verdict) = oneshot::channel();
        self.transfers
            .send(PendingTransfer {
                request: request.clone(),
                complete,
            })
            .map_err(|_| TransferError::Closed)?;
        verdict.await.unwrap_or(Err(TransferError::Closed))
    }
}

pub struct Harness {
    pub handle: DispatcherHandle,
    pub bus: EventBus,
    transfers: mpsc::UnboundedReceiver<PendingTransfer>,
}

impl Harness {
    pub fn start() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Same stack over a bus that holds at most `capacity` unread events.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (tx, transfers) = mpsc::unbounded_channel();
        let bus = EventBus::new(capacity);
        let executor = Arc::new(TaskExecutor::new(
            Arc::new(ScriptedTransport { transfers: tx }),
            bus.clone(),
        ));
        let dispatcher = Dispatcher::new(executor, bus.clone());
        let (handle, _task) = DispatcherService::spawn(dispatcher, DEFAULT_COMMAND_CAPACITY);

        Self {
            handle,
            bus,
            transfers,
        }
    }

    /// Wait for the executor to begin the next transfer.
    pub async fn next_transfer(&mut self) -> PendingTransfer {
        timeout(TEST_TIMEOUT, self.transfers.recv())
            .await
            .expect("timed out waiting for a transfer")
            .expect("transport dropped")
    }

    /// Assert no transfer begins within a short grace period.
    pub async fn assert_no_transfer(&mut self) {
        let next = timeout(Duration::from_millis(150), self.transfers.recv()).await;
        assert!(next.is_err(), "unexpected transfer started");
    }

    /// Poll the dispatcher until `done` holds.
    pub async fn wait_for_status(
        &self,
        done: impl Fn(&DispatcherStatus) -> bool,
    ) -> DispatcherStatus {
        timeout(TEST_TIMEOUT, async {
            loop {
                let status = self.handle.status().await.expect("dispatcher stopped");
                if done(&status) {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for dispatcher status")
    }
}

/// Receive events until one with `status` arrives.
pub async fn next_event_with_status(
    rx: &mut tokio::sync::broadcast::Receiver<UploadEvent>,
    status: UploadStatus,
) -> UploadEvent {
    timeout(TEST_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if event.status == status {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
