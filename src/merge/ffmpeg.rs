//! FFmpeg invocation for the merge strategies
//!
//! The [`Transcoder`] trait is the subprocess seam: the pipeline builds
//! argument vectors, the transcoder runs them. Tests substitute a scripted
//! implementation; production uses [`FfmpegTranscoder`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use thiserror::Error;

/// A transcoder subprocess failure
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transcoder exited with {status}: {stderr}")]
    Failed { status: i32, stderr: String },
}

/// Runs one transcoder invocation to completion
pub trait Transcoder: Send + Sync {
    fn run(&self, args: &[String]) -> Result<(), TranscodeError>;
}

/// The real ffmpeg binary
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn run(&self, args: &[String]) -> Result<(), TranscodeError> {
        tracing::info!("running {:?} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| TranscodeError::Launch {
                program: self.program.to_string_lossy().to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // ffmpeg logs its whole banner to stderr; keep the tail where
            // the actual error lands
            let tail: Vec<&str> = stderr.lines().rev().take(8).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(TranscodeError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: tail.join("\n"),
            });
        }

        Ok(())
    }
}

/// Write a concat-demuxer manifest listing each segment's absolute path.
///
/// The temp file deletes itself on drop, so the manifest is removed after
/// the subprocess exits regardless of outcome.
pub fn write_manifest(paths: &[PathBuf]) -> std::io::Result<NamedTempFile> {
    let mut manifest = tempfile::Builder::new()
        .prefix("blockreel_concat_")
        .suffix(".txt")
        .tempfile()?;

    for path in paths {
        // concat demuxer quoting: single quotes, embedded quotes as '\''
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        writeln!(manifest, "file '{escaped}'")?;
    }
    manifest.flush()?;
    Ok(manifest)
}

/// Arguments for the primary strategy: stream-copy concatenation.
///
/// Fast and lossless, but every input must share compatible codec and
/// container parameters.
pub fn concat_copy_args(manifest: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        manifest.to_string_lossy().to_string(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().to_string(),
    ]
}

/// Arguments for the fallback strategy: re-encoding concatenation.
///
/// Every segment becomes an input joined through a concat filter graph.
/// Frame-accurate and tolerant of mismatched parameters, at re-encode cost.
pub fn concat_reencode_args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
    let mut args = vec!["-y".to_string()];

    for input in inputs {
        args.push("-i".into());
        args.push(input.to_string_lossy().to_string());
    }

    let pads: String = (0..inputs.len())
        .map(|i| format!("[{i}:v][{i}:a]"))
        .collect();
    let filter = format!("{}concat=n={}:v=1:a=1[v][a]", pads, inputs.len());

    args.extend([
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "[a]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        "23".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        output.to_string_lossy().to_string(),
    ]);

    args
}
