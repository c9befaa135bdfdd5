//! Pending upload queue.

use std::collections::VecDeque;

use crate::request::JobRequest;

/// FIFO buffer of requests waiting for the in-flight job to end.
///
/// Holds no lock of its own; the dispatcher owns it and mutates it only from
/// its single processing task.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: VecDeque<JobRequest>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the tail.
    pub fn enqueue(&mut self, request: JobRequest) {
        self.pending.push_back(request);
    }

    /// Remove and return the head, if any.
    pub fn dequeue_next(&mut self) -> Option<JobRequest> {
        self.pending.pop_front()
    }

    /// Drop every pending request. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending requests in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &JobRequest> {
        self.pending.iter()
    }
}
