//! Upload dispatcher: runs one upload at a time, queues the rest.
//!
//! - `state`: the [`Dispatcher`] state machine (IDLE / BUSY)
//! - `service`: task owning the dispatcher, plus its [`DispatcherHandle`]

pub mod service;
pub mod state;

pub use service::{DispatcherHandle, DispatcherService, DEFAULT_COMMAND_CAPACITY};
pub use state::{
    CancelOutcome, CurrentJob, DispatchState, Dispatcher, DispatcherStatus, SubmitOutcome,
    Transition,
};
