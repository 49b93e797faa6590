//! Recording backend abstraction
//!
//! Trait seam over the external recording engine plus the asynchronous
//! event stream it feeds the controller. Commands only request transitions;
//! the event stream is the authoritative source of truth about what the
//! backend actually did.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BackendError, ConnectError};

pub use mock::MockBackend;

/// Asynchronous notification from the recording backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The control connection to the backend came up
    ConnectionOpened,

    /// The control connection closed (orderly or not)
    ConnectionClosed,

    /// The connection failed with an error message
    ConnectionError(String),

    /// The backend's recording state changed
    RecordingStateChanged {
        active: bool,
        /// Path of the file being written, when the backend reports it
        output_path: Option<String>,
        /// Bytes written so far, when the backend reports it
        size_bytes: Option<u64>,
        /// Recording timecode at the moment of the change
        timecode: Option<String>,
    },
}

/// Channel the backend pushes [`BackendEvent`]s into
pub type BackendEventSender = tokio::sync::mpsc::UnboundedSender<BackendEvent>;
/// Receiving side consumed by the controller loop
pub type BackendEventReceiver = tokio::sync::mpsc::UnboundedReceiver<BackendEvent>;

/// Scene/source/recording-path metadata reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSettings {
    /// Name of the currently active scene, if any
    pub current_scene: Option<String>,

    /// Source names in the active scene
    pub sources: Vec<String>,

    /// Directory the backend is configured to record into
    pub recording_path: Option<String>,
}

/// Connection state owned exclusively by the controller loop.
///
/// `connected == false` forbids any session transition to Recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub address: String,
    pub last_error: Option<String>,
}

/// Operations the controller requires from a recording engine.
///
/// Every call may fail; success only means the backend acknowledged the
/// request. Completion arrives later on the event stream.
#[async_trait]
pub trait RecordingBackend: Send + Sync {
    /// Open the control connection
    async fn connect(&self, address: &str, password: &str) -> Result<(), ConnectError>;

    /// Close the control connection (used on graceful shutdown)
    async fn disconnect(&self) -> Result<(), BackendError>;

    /// Ask the backend to begin recording
    async fn start_recording(&self) -> Result<(), BackendError>;

    /// Ask the backend to stop recording
    async fn stop_recording(&self) -> Result<(), BackendError>;

    /// Point the backend's recording output at a directory
    async fn set_output_directory(&self, path: &Path) -> Result<(), BackendError>;

    /// Whether the backend believes a recording is active right now
    async fn query_recording_active(&self) -> Result<bool, BackendError>;

    /// Scene/source/recording-path metadata for refresh_settings
    async fn fetch_settings(&self) -> Result<BackendSettings, BackendError>;
}
