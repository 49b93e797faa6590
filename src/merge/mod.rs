//! Segment merge pipeline
//!
//! Validates an ordered list of block filenames against the segment store,
//! then produces one artifact: a byte copy for a single segment, otherwise
//! stream-copy concatenation with a re-encoding fallback when the primary
//! strategy's subprocess fails.

pub mod ffmpeg;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use crate::store::{SegmentFile, SegmentStore};

pub use ffmpeg::{FfmpegTranscoder, TranscodeError, Transcoder};
pub use types::{MergeError, MergeJob, MergeResult, MergeStrategy, REJECTED_MARKER};

/// The merge pipeline: validation, strategy selection, escalation
pub struct MergePipeline {
    store: SegmentStore,
    output_dir: PathBuf,
    extension: String,
    transcoder: Arc<dyn Transcoder>,
}

impl MergePipeline {
    pub fn new(
        store: SegmentStore,
        extension: impl Into<String>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let output_dir = store.output_dir().to_path_buf();
        Self {
            store,
            output_dir,
            extension: extension.into(),
            transcoder,
        }
    }

    /// Filter a caller-ordered block list down to segments that exist.
    ///
    /// Empty names, the `[rejected]` marker, and names that do not resolve
    /// on disk are dropped. Surviving order is exactly the given order; the
    /// caller decides playback order, never this pipeline.
    pub fn validate(&self, blocks: &[String]) -> Result<Vec<SegmentFile>, MergeError> {
        let valid: Vec<SegmentFile> = blocks
            .iter()
            .filter(|name| !name.is_empty() && name.as_str() != REJECTED_MARKER)
            .filter_map(|name| {
                let resolved = self.store.resolve(name);
                if resolved.is_none() {
                    tracing::warn!(%name, "skipping block with no segment file on disk");
                }
                resolved
            })
            .collect();

        if valid.is_empty() {
            return Err(MergeError::NoValidSegments);
        }
        Ok(valid)
    }

    /// Run one merge job to completion.
    ///
    /// Blocking (subprocess waits); the controller calls this on a worker
    /// context, never on the event loop.
    pub fn run(&self, job: &MergeJob) -> Result<MergeResult, MergeError> {
        if job.project_name.is_empty()
            || job.project_name.contains('/')
            || job.project_name.contains('\\')
        {
            return Err(MergeError::InvalidProjectName(job.project_name.clone()));
        }

        let segments = self.validate(&job.blocks)?;
        let paths: Vec<PathBuf> = segments.iter().map(|s| PathBuf::from(&s.full_path)).collect();

        tracing::info!(
            blocks = segments.len(),
            project = %job.project_name,
            "starting merge"
        );

        if let [single] = paths.as_slice() {
            return self.copy_single(single, &job.project_name);
        }

        let primary_output = self.artifact_path(&job.project_name, "");
        let fallback_output = self.artifact_path(&job.project_name, "_reencoded");
        for candidate in [&primary_output, &fallback_output] {
            if paths.contains(candidate) {
                return Err(MergeError::OutputOverwritesSource(
                    candidate.to_string_lossy().to_string(),
                ));
            }
        }
        match self.run_primary(&paths, &primary_output)? {
            Ok(()) => self.finish(primary_output, segments.len(), MergeStrategy::Primary),
            Err(primary_err) => {
                tracing::warn!(
                    "primary merge strategy failed, escalating to re-encode: {}",
                    primary_err
                );
                // Distinct output name so a partial primary artifact is
                // never silently overwritten.
                let args = ffmpeg::concat_reencode_args(&paths, &fallback_output);
                match self.transcoder.run(&args) {
                    Ok(()) => {
                        self.finish(fallback_output, segments.len(), MergeStrategy::Fallback)
                    }
                    Err(fallback_err) => Err(MergeError::MergeFailed {
                        primary: primary_err.to_string(),
                        fallback: fallback_err.to_string(),
                    }),
                }
            }
        }
    }

    fn artifact_path(&self, project_name: &str, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{project_name}{suffix}.{}", self.extension))
    }

    /// Single segment: byte-for-byte copy, no transcoding and no re-encode
    /// artifacts for the trivial case.
    fn copy_single(&self, source: &PathBuf, project_name: &str) -> Result<MergeResult, MergeError> {
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| self.extension.clone());
        let output = self.output_dir.join(format!("{project_name}.{extension}"));

        // fs::copy onto the source itself truncates it before reading
        if output == *source {
            return Err(MergeError::OutputOverwritesSource(
                output.to_string_lossy().to_string(),
            ));
        }

        std::fs::copy(source, &output)?;
        self.finish(output, 1, MergeStrategy::Copy)
    }

    /// Run the primary strategy. The outer Result is manifest IO; the inner
    /// one is the subprocess verdict that decides escalation.
    fn run_primary(
        &self,
        paths: &[PathBuf],
        output: &PathBuf,
    ) -> Result<Result<(), TranscodeError>, MergeError> {
        // Manifest lives as long as this scope; removed on drop either way.
        let manifest = ffmpeg::write_manifest(paths)?;
        let args = ffmpeg::concat_copy_args(manifest.path(), output);
        Ok(self.transcoder.run(&args))
    }

    fn finish(
        &self,
        output: PathBuf,
        blocks_used: usize,
        strategy_used: MergeStrategy,
    ) -> Result<MergeResult, MergeError> {
        // Size comes from the filesystem, not from the subprocess's own
        // reporting.
        let size_bytes = SegmentStore::file_size(&output)?;
        tracing::info!(
            output = %output.display(),
            size_bytes,
            ?strategy_used,
            "merge complete"
        );
        Ok(MergeResult {
            output_path: output,
            size_bytes,
            blocks_used,
            strategy_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::Path;

    /// Scripted transcoder: pops a verdict per invocation, records args and
    /// any concat manifest contents, and creates the output file (last arg)
    /// on success like ffmpeg would.
    struct FakeTranscoder {
        verdicts: Mutex<VecDeque<Result<(), String>>>,
        invocations: Mutex<Vec<Vec<String>>>,
        manifests: Mutex<Vec<String>>,
    }

    impl FakeTranscoder {
        fn scripted(verdicts: Vec<Result<(), String>>) -> Arc<Self> {
            Arc::new(Self {
                verdicts: Mutex::new(verdicts.into()),
                invocations: Mutex::new(Vec::new()),
                manifests: Mutex::new(Vec::new()),
            })
        }

        fn invocations(&self) -> Vec<Vec<String>> {
            self.invocations.lock().clone()
        }

        fn manifests(&self) -> Vec<String> {
            self.manifests.lock().clone()
        }
    }

    impl Transcoder for FakeTranscoder {
        fn run(&self, args: &[String]) -> Result<(), TranscodeError> {
            self.invocations.lock().push(args.to_vec());
            // the manifest only exists while the subprocess runs; capture it
            if let Some(pos) = args.iter().position(|a| a == "-i") {
                if args[pos + 1].ends_with(".txt") {
                    self.manifests
                        .lock()
                        .push(fs::read_to_string(&args[pos + 1]).unwrap());
                }
            }
            match self.verdicts.lock().pop_front().unwrap_or(Ok(())) {
                Ok(()) => {
                    let output = args.last().unwrap();
                    fs::write(output, b"merged").unwrap();
                    Ok(())
                }
                Err(stderr) => Err(TranscodeError::Failed { status: 1, stderr }),
            }
        }
    }

    fn pipeline_in(dir: &Path, transcoder: Arc<FakeTranscoder>) -> MergePipeline {
        let store = SegmentStore::new(&Config::new(dir));
        MergePipeline::new(store, "mkv", transcoder)
    }

    fn seed(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), format!("content of {name}")).unwrap();
        }
    }

    fn job(blocks: &[&str], project: &str) -> MergeJob {
        MergeJob {
            blocks: blocks.iter().map(|s| s.to_string()).collect(),
            project_name: project.to_string(),
        }
    }

    #[test]
    fn test_validate_filters_and_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["a.mp4", "b.mp4"]);
        let pipeline = pipeline_in(dir.path(), FakeTranscoder::scripted(vec![]));

        let blocks: Vec<String> = ["a.mp4", "", "[rejected]", "missing.mp4", "b.mp4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let valid = pipeline.validate(&blocks).unwrap();
        let names: Vec<&str> = valid.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4"]);
    }

    #[test]
    fn test_validate_empty_result_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path(), FakeTranscoder::scripted(vec![]));
        let err = pipeline
            .validate(&["missing.mkv".to_string(), String::new()])
            .unwrap_err();
        assert!(matches!(err, MergeError::NoValidSegments));
    }

    #[test]
    fn test_single_segment_is_a_byte_copy_with_no_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["only.mkv"]);
        let transcoder = FakeTranscoder::scripted(vec![]);
        let pipeline = pipeline_in(dir.path(), transcoder.clone());

        let result = pipeline.run(&job(&["only.mkv"], "final")).unwrap();
        assert_eq!(result.strategy_used, MergeStrategy::Copy);
        assert_eq!(result.blocks_used, 1);
        assert!(transcoder.invocations().is_empty());

        let original = fs::read(dir.path().join("only.mkv")).unwrap();
        let copied = fs::read(dir.path().join("final.mkv")).unwrap();
        assert_eq!(original, copied);
        assert_eq!(result.size_bytes, original.len() as u64);
    }

    #[test]
    fn test_primary_strategy_preserves_caller_order() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["z.mkv", "a.mkv", "m.mkv"]);
        let transcoder = FakeTranscoder::scripted(vec![Ok(())]);
        let pipeline = pipeline_in(dir.path(), transcoder.clone());

        let result = pipeline.run(&job(&["z.mkv", "a.mkv", "m.mkv"], "episode")).unwrap();
        assert_eq!(result.strategy_used, MergeStrategy::Primary);
        assert_eq!(result.blocks_used, 3);
        assert!(result.output_path.ends_with("episode.mkv"));

        // One invocation, pointing at a concat manifest
        let invocations = transcoder.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0][2], "concat");
        assert!(invocations[0].contains(&"copy".to_string()));

        // manifest listed the segments in caller order, not sorted
        let manifests = transcoder.manifests();
        assert_eq!(manifests.len(), 1);
        let lines: Vec<&str> = manifests[0].lines().collect();
        assert!(lines[0].ends_with("z.mkv'"));
        assert!(lines[1].ends_with("a.mkv'"));
        assert!(lines[2].ends_with("m.mkv'"));
    }

    #[test]
    fn test_fallback_gets_the_same_segment_set() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["a.mkv", "b.mkv"]);
        let transcoder =
            FakeTranscoder::scripted(vec![Err("codec mismatch".into()), Ok(())]);
        let pipeline = pipeline_in(dir.path(), transcoder.clone());

        let result = pipeline.run(&job(&["a.mkv", "b.mkv"], "episode")).unwrap();
        assert_eq!(result.strategy_used, MergeStrategy::Fallback);
        assert!(result.output_path.ends_with("episode_reencoded.mkv"));

        let invocations = transcoder.invocations();
        assert_eq!(invocations.len(), 2);
        // fallback lists both segments as inputs, caller order
        let fallback = &invocations[1];
        let a = fallback
            .iter()
            .position(|s| s.ends_with("a.mkv"))
            .unwrap();
        let b = fallback
            .iter()
            .position(|s| s.ends_with("b.mkv"))
            .unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_both_failures_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["a.mkv", "b.mkv"]);
        let transcoder = FakeTranscoder::scripted(vec![
            Err("primary exploded".into()),
            Err("fallback exploded".into()),
        ]);
        let pipeline = pipeline_in(dir.path(), transcoder);

        let err = pipeline.run(&job(&["a.mkv", "b.mkv"], "episode")).unwrap_err();
        match err {
            MergeError::MergeFailed { primary, fallback } => {
                assert!(primary.contains("primary exploded"));
                assert!(fallback.contains("fallback exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_project_name_cannot_escape_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["a.mkv"]);
        let pipeline = pipeline_in(dir.path(), FakeTranscoder::scripted(vec![]));
        let err = pipeline.run(&job(&["a.mkv"], "../escape")).unwrap_err();
        assert!(matches!(err, MergeError::InvalidProjectName(_)));
    }

    #[test]
    fn test_single_segment_refuses_to_overwrite_itself() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["final.mkv"]);
        let before = fs::read(dir.path().join("final.mkv")).unwrap();
        let pipeline = pipeline_in(dir.path(), FakeTranscoder::scripted(vec![]));

        // project name collides with the sole segment's basename
        let err = pipeline.run(&job(&["final.mkv"], "final")).unwrap_err();
        assert!(matches!(err, MergeError::OutputOverwritesSource(_)));

        // the segment survives untouched
        let after = fs::read(dir.path().join("final.mkv")).unwrap();
        assert_eq!(before, after);
        assert!(!after.is_empty());
    }

    #[test]
    fn test_multi_segment_refuses_output_colliding_with_a_source() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["a.mkv", "episode.mkv"]);
        let transcoder = FakeTranscoder::scripted(vec![]);
        let pipeline = pipeline_in(dir.path(), transcoder.clone());

        let err = pipeline
            .run(&job(&["a.mkv", "episode.mkv"], "episode"))
            .unwrap_err();
        assert!(matches!(err, MergeError::OutputOverwritesSource(_)));
        // rejected before any subprocess could touch the files
        assert!(transcoder.invocations().is_empty());
    }

    #[test]
    fn test_single_segment_keeps_source_extension() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["take.mp4"]);
        let pipeline = pipeline_in(dir.path(), FakeTranscoder::scripted(vec![]));
        let result = pipeline.run(&job(&["take.mp4"], "final")).unwrap();
        assert!(result.output_path.ends_with("final.mp4"));
    }
}
