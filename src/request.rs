//! Upload job requests.

use serde::{Deserialize, Serialize};

/// Review-mode tag attached to every upload. Opaque to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewMode(pub i32);

/// A unit of upload work: which instances to send and over which transport.
///
/// Transport parameters travel inside the variant and are never inspected
/// by the dispatcher; only the transport that executes the job reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum JobRequest {
    /// Send over the Wi-Fi hotspot to the receiver listening on `port`.
    Hotspot {
        instances: Vec<i64>,
        port: u16,
        mode: ReviewMode,
    },
    /// Send over a Bluetooth link.
    Bluetooth { instances: Vec<i64>, mode: ReviewMode },
}

impl JobRequest {
    pub fn hotspot(instances: Vec<i64>, port: u16, mode: ReviewMode) -> Self {
        Self::Hotspot {
            instances,
            port,
            mode,
        }
    }

    pub fn bluetooth(instances: Vec<i64>, mode: ReviewMode) -> Self {
        Self::Bluetooth { instances, mode }
    }

    /// Instance ids carried by this request.
    pub fn instances(&self) -> &[i64] {
        match self {
            Self::Hotspot { instances, .. } | Self::Bluetooth { instances, .. } => instances,
        }
    }

    pub fn mode(&self) -> ReviewMode {
        match self {
            Self::Hotspot { mode, .. } | Self::Bluetooth { mode, .. } => *mode,
        }
    }

    /// Transport name (matches the serde tag).
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Hotspot { .. } => "hotspot",
            Self::Bluetooth { .. } => "bluetooth",
        }
    }
}
