use std::io;
use thiserror::Error;

/// Errors raised by the process-manager client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level IO failure during send.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A send was attempted while no connection is established. Commands are
    /// never buffered across reconnects; the caller must re-issue the send.
    #[error("not connected to the process manager")]
    NotConnected,

    /// The command could not be encoded for the wire.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Errors raised at the scene-state-machine boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    /// A start was requested without an app id.
    #[error("no app id given for start request")]
    MissingAppId,

    /// The app id cannot appear on the wire (empty, non-ASCII, whitespace
    /// or a ':' separator).
    #[error("invalid app id: {0:?}")]
    InvalidAppId(String),

    /// A start was requested while a previous one is still unanswered.
    /// The protocol has no correlation ids, so starts must be serialized.
    #[error("a start request is already pending")]
    StartPending,
}

/// Type alias for Result with ClientError
pub type Result<T> = std::result::Result<T, ClientError>;
