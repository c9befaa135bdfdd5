//! Hotspot transport: line-delimited JSON over TCP.
//!
//! The sender writes a single header line and waits for one reply line:
//!
//! ```text
//! -> {"mode":1,"instances":[4,5,6]}
//! <- ok
//! ```

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use super::Transport;
use crate::error::TransferError;
use crate::request::{JobRequest, ReviewMode};

/// Acknowledgement line expected from the receiver.
const ACK: &str = "ok";

#[derive(Serialize)]
struct TransferHeader<'a> {
    mode: ReviewMode,
    instances: &'a [i64],
}

/// Sends hotspot jobs to `host:<port from the request>`.
#[derive(Debug, Clone)]
pub struct HotspotTransport {
    host: String,
}

impl HotspotTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl Transport for HotspotTransport {
    async fn send(&self, request: &JobRequest) -> Result<(), TransferError> {
        let JobRequest::Hotspot {
            instances,
            port,
            mode,
        } = request
        else {
            return Err(TransferError::Unsupported {
                transport: request.transport_name().to_string(),
            });
        };

        let addr = format!("{}:{}", self.host, port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| TransferError::Connect {
                addr: addr.clone(),
                source,
            })?;
        debug!(addr = %addr, count = instances.len(), "Connected to receiver");

        let (read_half, mut write_half) = stream.into_split();

        let mut header = serde_json::to_vec(&TransferHeader {
            mode: *mode,
            instances,
        })?;
        header.push(b'\n');
        write_half.write_all(&header).await?;
        write_half.flush().await?;

        let mut reply = String::new();
        let read = BufReader::new(read_half).read_line(&mut reply).await?;
        if read == 0 {
            return Err(TransferError::Closed);
        }

        let reply = reply.trim();
        if reply.eq_ignore_ascii_case(ACK) {
            Ok(())
        } else {
            Err(TransferError::Rejected {
                reply: reply.to_string(),
            })
        }
    }
}
