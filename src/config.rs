//! Controller configuration
//!
//! Output locations, discovery extensions, and the transcoder binary used
//! by the merge pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the recording controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory the backend writes segment files into, and where merge
    /// artifacts are produced
    pub output_dir: PathBuf,

    /// File extensions treated as video segments during discovery
    #[serde(default = "default_extensions")]
    pub video_extensions: Vec<String>,

    /// Path to the ffmpeg binary used by the merge pipeline
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// How long a test recording runs before the unconditional stop
    #[serde(default = "default_test_delay", with = "duration_secs")]
    pub test_recording_delay: Duration,
}

fn default_extensions() -> Vec<String> {
    vec!["mkv".into(), "mp4".into(), "mov".into(), "flv".into()]
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_test_delay() -> Duration {
    Duration::from_secs(5)
}

impl Config {
    /// Create a config for the given output directory with defaults
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            video_extensions: default_extensions(),
            ffmpeg_path: default_ffmpeg(),
            test_recording_delay: default_test_delay(),
        }
    }

    /// Whether a filename carries one of the configured video extensions
    pub fn is_video_file(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.video_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    /// Preferred extension for merge artifacts
    pub fn merge_extension(&self) -> &str {
        self.video_extensions
            .first()
            .map(String::as_str)
            .unwrap_or("mkv")
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
