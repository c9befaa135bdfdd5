//! Upload status events and the in-process bus that carries them.
//!
//! Executors publish job progress here; the dispatcher subscribes once and
//! reacts to terminal statuses. Any number of observers (WebSocket clients,
//! tests) may subscribe alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::executor::JobHandle;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Status carried by an [`UploadEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// The executor began running the job.
    Started,
    /// Intermediate progress report.
    Progress,
    /// The job completed successfully.
    Finished,
    /// The job failed.
    Error,
    /// The job was cancelled.
    Cancelled,
}

impl UploadStatus {
    /// Whether the job will not progress any further after this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A status signal for an upload job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub status: UploadStatus,
    /// Job the event belongs to, when the producer knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobHandle>,
    /// Free-form detail (error text, progress note).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UploadEvent {
    pub fn new(status: UploadStatus) -> Self {
        Self {
            status,
            job: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the job this event belongs to.
    pub fn for_job(mut self, job: JobHandle) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Fan-out bus for [`UploadEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<UploadEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers that fall more than `capacity` events behind observe
    /// `RecvError::Lagged` and skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: UploadEvent) {
        // Zero receivers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(UploadStatus::Finished.is_terminal());
        assert!(UploadStatus::Error.is_terminal());
        assert!(UploadStatus::Cancelled.is_terminal());
        assert!(!UploadStatus::Started.is_terminal());
        assert!(!UploadStatus::Progress.is_terminal());
    }

    #[tokio::test]
    async fn every_subscriber_receives_published_events() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let job = JobHandle::new();
        bus.publish(UploadEvent::new(UploadStatus::Finished).for_job(job));

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.status, UploadStatus::Finished);
            assert_eq!(event.job, Some(job));
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(UploadEvent::new(UploadStatus::Error).with_detail("nobody listening"));
    }

    #[test]
    fn serializes_status_in_snake_case() {
        let json = serde_json::to_value(UploadEvent::new(UploadStatus::Cancelled)).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert!(json.get("job").is_none());
    }
}
