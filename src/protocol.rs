//! Control-channel message shapes
//!
//! Inbound client commands and outbound broadcast events, serialized as
//! tagged JSON objects. The transport that carries these is external; this
//! module only fixes the wire shapes.

use serde::{Deserialize, Serialize};

use crate::backend::BackendSettings;
use crate::merge::MergeStrategy;
use crate::store::SegmentFile;

/// Inbound control message from a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Connect to the recording backend
    ConnectObs { address: String, password: String },

    /// Begin recording one block
    #[serde(rename_all = "camelCase")]
    StartRecording { block_index: u32, block_text: String },

    /// Stop the active block recording
    StopRecording {},

    /// Fire-and-forget short recording to verify the chain end to end
    TestRecording {},

    /// Merge an ordered list of block files into one artifact
    #[serde(rename_all = "camelCase")]
    MergeVideos {
        blocks: Vec<String>,
        project_name: String,
    },

    /// Re-query backend metadata and rebroadcast it
    RefreshSettings {},

    /// Reveal the output directory in the OS file browser
    OpenVideoFolder {},
}

/// Outbound event broadcast to every attached listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Backend connection status, also pushed to newly attached listeners
    ObsStatus {
        connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The backend confirmed a block recording is running
    #[serde(rename_all = "camelCase")]
    RecordingStarted {
        filename: String,
        full_path: String,
        block_index: u32,
    },

    /// The backend confirmed a block recording finished
    #[serde(rename_all = "camelCase")]
    RecordingStopped {
        filename: String,
        full_path: String,
        block_index: u32,
        output_bytes: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        timecode: Option<String>,
        file_exists: bool,
    },

    /// A merge completed and its artifact is on disk.
    ///
    /// `strategy_used` carries one of three wire values: `"copy"` when a
    /// lone segment was duplicated without a subprocess, `"primary"` for
    /// stream-copy concatenation, `"fallback"` for the re-encode path.
    #[serde(rename_all = "camelCase")]
    VideoMerged {
        output_file: String,
        file_size: u64,
        blocks_used: usize,
        strategy_used: MergeStrategy,
    },

    /// Current segment listing, pushed to newly attached listeners
    Segments { files: Vec<SegmentFile> },

    /// Backend metadata from a refresh_settings request
    Settings(BackendSettings),

    /// A failure worth telling every listener about
    Error { message: String },
}
