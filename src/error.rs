//! Error types and handling
//!
//! Common error types used across the crate. Wire-level error payloads are
//! built from these at the control-channel edge.

use thiserror::Error;

use crate::merge::MergeError;
use crate::session::SessionError;

/// Errors from the recording backend connection handshake.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("backend unreachable at {address}: {message}")]
    Unreachable { address: String, message: String },

    #[error("backend rejected credentials: {0}")]
    AuthRejected(String),
}

/// Errors from backend operations after a connection is established.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend not connected")]
    NotConnected,

    #[error("backend rejected request: {0}")]
    RequestRejected(String),

    #[error("backend transport error: {0}")]
    Transport(String),
}

/// Top-level error type covering every controller operation.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("controller is shut down")]
    ControllerClosed,
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
