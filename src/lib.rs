//! Share Sender: single-flight upload dispatcher.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod queue;
pub mod request;
pub mod transport;
