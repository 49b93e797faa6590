//! Merge job, result, and error types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Marker a client uses to flag a block that must never be merged
pub const REJECTED_MARKER: &str = "[rejected]";

/// One merge request: an ordered list of block filenames and the output name.
///
/// Ephemeral; lives only for the duration of one merge invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeJob {
    /// Caller-ordered block filenames; this order is the playback order
    pub blocks: Vec<String>,

    /// Basename of the output artifact
    pub project_name: String,
}

/// Which strategy produced a merge artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Single-segment byte copy, no subprocess involved
    Copy,
    /// Stream-copy concatenation via the concat demuxer
    Primary,
    /// Re-encoding concatenation via a filter graph
    Fallback,
}

/// Outcome of a successful merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// Path of the produced artifact
    pub output_path: PathBuf,

    /// Artifact size read from the filesystem, never from the subprocess
    pub size_bytes: u64,

    /// How many segments went into the artifact
    pub blocks_used: usize,

    /// Strategy that produced the artifact
    pub strategy_used: MergeStrategy,
}

/// Merge pipeline errors
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no valid segments to merge")]
    NoValidSegments,

    #[error("a merge is already in progress")]
    MergeInProgress,

    #[error("invalid project name: {0:?}")]
    InvalidProjectName(String),

    #[error("output {0} would overwrite a source segment")]
    OutputOverwritesSource(String),

    #[error("merge failed; primary: {primary}; fallback: {fallback}")]
    MergeFailed { primary: String, fallback: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
