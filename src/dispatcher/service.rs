//! Dispatcher service: serializes callers and upload events onto one task.
//!
//! Callers talk to the service through a cloneable [`DispatcherHandle`]; every
//! operation is a [`Command`] carrying a oneshot reply. The service task is the
//! only code that touches the [`Dispatcher`], so commands and events never
//! interleave.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{CancelOutcome, Dispatcher, DispatcherStatus, SubmitOutcome};
use crate::error::DispatchError;
use crate::events::UploadEvent;
use crate::request::{JobRequest, ReviewMode};

/// Default capacity of the command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Requests sent from a handle to the service task.
#[derive(Debug)]
enum Command {
    Submit {
        request: JobRequest,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Cancel {
        reply: oneshot::Sender<CancelOutcome>,
    },
    Status {
        reply: oneshot::Sender<DispatcherStatus>,
    },
}

/// Cloneable client of a running [`DispatcherService`].
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Command>,
}

impl DispatcherHandle {
    /// Submit an upload. Starts it now if idle, queues it otherwise.
    pub async fn submit(&self, request: JobRequest) -> Result<SubmitOutcome, DispatchError> {
        self.request(|reply| Command::Submit { request, reply }).await
    }

    /// Upload `instances` over the hotspot to the receiver on `port`.
    pub async fn start_hotspot_upload(
        &self,
        instances: Vec<i64>,
        port: u16,
        mode: ReviewMode,
    ) -> Result<SubmitOutcome, DispatchError> {
        self.submit(JobRequest::hotspot(instances, port, mode)).await
    }

    /// Upload `instances` over Bluetooth.
    pub async fn start_bluetooth_upload(
        &self,
        instances: Vec<i64>,
        mode: ReviewMode,
    ) -> Result<SubmitOutcome, DispatchError> {
        self.submit(JobRequest::bluetooth(instances, mode)).await
    }

    /// Cancel the in-flight upload.
    pub async fn cancel(&self) -> Result<CancelOutcome, DispatchError> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    pub async fn status(&self) -> Result<DispatcherStatus, DispatchError> {
        self.request(|reply| Command::Status { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| DispatchError::Stopped)?;
        rx.await.map_err(|_| DispatchError::Stopped)
    }
}

/// The single task that owns a [`Dispatcher`].
pub struct DispatcherService {
    dispatcher: Dispatcher,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Receiver<UploadEvent>,
}

impl DispatcherService {
    /// Subscribe to the dispatcher's bus and spawn the service task.
    ///
    /// The subscription is taken before spawning, so every event published
    /// after this call returns reaches the dispatcher.
    pub fn spawn(
        dispatcher: Dispatcher,
        command_capacity: usize,
    ) -> (DispatcherHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::channel(command_capacity);
        let events = dispatcher.bus().subscribe();

        let service = Self {
            dispatcher,
            commands,
            events,
        };
        let task = tokio::spawn(service.run());

        (DispatcherHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("Dispatcher service started");

        loop {
            tokio::select! {
                // Events first: an event published before a command was sent
                // is applied before that command.
                biased;

                result = self.events.recv() => match result {
                    Ok(event) => {
                        let transition = self.dispatcher.handle_event(&event).await;
                        debug!(status = %event.status, ?transition, "Applied upload event");
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // A missed terminal event leaves the current job in place
                        // until cancelled.
                        warn!(missed, "Dispatcher lagged behind upload events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Upload event bus closed");
                        break;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(command) => self.execute(command).await,
                    None => {
                        debug!("All dispatcher handles dropped");
                        break;
                    }
                },
            }
        }

        info!("Dispatcher service stopped");
    }

    async fn execute(&mut self, command: Command) {
        // Callers may have given up waiting; a dropped reply is fine.
        match command {
            Command::Submit { request, reply } => {
                let outcome = self.dispatcher.submit(request).await;
                let _ = reply.send(outcome);
            }
            Command::Cancel { reply } => {
                let outcome = self.dispatcher.cancel().await;
                let _ = reply.send(outcome);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.dispatcher.status());
            }
        }
    }
}
