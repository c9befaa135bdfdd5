//! Transports move a job's instances to the receiving device.

pub mod hotspot;

use async_trait::async_trait;

use crate::error::TransferError;
use crate::request::JobRequest;

pub use hotspot::HotspotTransport;

/// Delivers the payload of a [`JobRequest`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request's instances. Resolves once the receiver acknowledged
    /// or the transfer failed.
    async fn send(&self, request: &JobRequest) -> Result<(), TransferError>;
}
