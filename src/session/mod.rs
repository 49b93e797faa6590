//! Recording session module
//!
//! One logical session exists at a time: the lifecycle of a single block
//! being recorded by the backend. The transition logic lives in
//! [`machine::SessionMachine`], a pure state machine with no I/O; the
//! controller loop feeds it commands and backend events and carries out the
//! effects it returns.

pub mod machine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use machine::SessionMachine;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recording in progress
    #[default]
    Idle,
    /// Start requested, waiting for backend confirmation
    Starting,
    /// Backend confirmed recording is running
    Recording,
    /// Stop requested, waiting for backend confirmation
    Stopping,
}

/// Errors from session lifecycle operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("recording backend is not connected")]
    BackendUnavailable,

    #[error("already recording block {block_index}")]
    AlreadyRecording { block_index: u32 },

    #[error("no active recording session")]
    NoActiveSession,
}

/// The block currently owned by the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBlock {
    /// Caller-supplied block index
    pub block_index: u32,

    /// Caller-supplied block text (script line, scene label, ...)
    pub block_text: String,

    /// When the start command was accepted
    pub started_at: DateTime<Utc>,

    /// Segment filename, known once the backend confirms the start
    pub segment_filename: Option<String>,

    /// Absolute segment path, known once the backend confirms the start
    pub segment_full_path: Option<String>,
}

/// The segment produced by the most recently finished session.
///
/// Retained until superseded by the next accepted start, so callers can
/// still reference "the file just produced" after the session returns to
/// Idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSegment {
    pub block_index: u32,
    pub filename: String,
    pub full_path: String,
}
