//! Error types for the share sender.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the dispatcher service.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatcher service has stopped")]
    Stopped,
}

/// Errors raised while moving a job's data to the receiver.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("No {transport} transport available on this host")]
    Unsupported { transport: String },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode transfer header: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Receiver rejected transfer: {reply}")]
    Rejected { reply: String },

    #[error("Receiver closed the connection before acknowledging")]
    Closed,
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
