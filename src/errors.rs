/// Error types for the hub
///
/// Every error surfaced to callers lives here:
/// - `HubError`: command protocol and hub availability
/// - `ClientError`: per-connection outbound queue
/// - `DispatchError`: action dispatch and codec failures
/// - `TransportError`: the duplex stream under a client
use thiserror::Error;

use crate::dispatch::ActionCode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The command's operation code has no handler in the event loop
    #[error("unknown command (op {0})")]
    UnknownCommand(u16),

    /// The command's argument does not fit its operation
    #[error("invalid command argument")]
    InvalidArgs,

    /// The result channel had no free slot when the command was submitted
    #[error("command result channel must have free capacity")]
    InvalidChannel,

    /// The event loop has stopped
    #[error("hub is closed")]
    HubClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("client outbound queue is closed")]
    QueueClosed,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// No response function registered for the inbound action
    #[error("unregistered action code {0}")]
    UnregisteredAction(ActionCode),

    /// Inbound payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Send(#[from] ClientError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),

    #[error("transport closed")]
    Closed,
}
