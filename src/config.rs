use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::output::{
    DEFAULT_CHANNELS, DEFAULT_CHUNK_LEN, DEFAULT_EXTENSION, DEFAULT_NUM_SHARDS,
};
use crate::errors::ShardError;
use crate::labels::{LabelEncoder, LabelProfile};
use crate::splits::{EmptySplitPolicy, SplitAssignment};
use crate::types::{Extension, SubjectId};

/// Top-level pipeline configuration.
///
/// Passed explicitly to `ShardPipeline`; nothing is read from globals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding per-subject source files.
    pub source_dir: PathBuf,
    /// Directory receiving container files and the manifest.
    pub output_dir: PathBuf,
    /// Channel depth written into every record; samples must match it.
    pub channels: u32,
    /// Source files per chunk.
    pub chunk_len: usize,
    /// Target shards per chunk. Zero produces no shard files.
    pub num_shards: usize,
    /// Label table used to encode sample labels.
    pub label_profile: LabelProfile,
    /// Container file extension, without the leading dot.
    pub extension: Extension,
    /// Subjects assigned to the test split.
    pub test_ids: BTreeSet<SubjectId>,
    /// Subjects assigned to the evaluation split.
    pub eval_ids: BTreeSet<SubjectId>,
    /// Handling of empty test/evaluation splits.
    pub empty_split_policy: EmptySplitPolicy,
    /// Worker threads for chunk processing; `None` uses the rayon default.
    pub workers: Option<usize>,
    /// Follow symlinks while listing `source_dir`.
    pub follow_links: bool,
    /// Write `manifest.json` next to the shards.
    pub write_manifest: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            channels: DEFAULT_CHANNELS,
            chunk_len: DEFAULT_CHUNK_LEN,
            num_shards: DEFAULT_NUM_SHARDS,
            label_profile: LabelProfile::default(),
            extension: DEFAULT_EXTENSION.to_string(),
            test_ids: BTreeSet::new(),
            eval_ids: BTreeSet::new(),
            empty_split_policy: EmptySplitPolicy::default(),
            workers: None,
            follow_links: false,
            write_manifest: true,
        }
    }
}

impl PipelineConfig {
    /// Config rooted at the given source and output directories, defaults elsewhere.
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ShardError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            ShardError::Config(format!("failed reading config '{}': {err}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            ShardError::Config(format!("invalid config '{}': {err}", path.display()))
        })
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<(), ShardError> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(ShardError::Config("source directory is not set".into()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ShardError::Config("output directory is not set".into()));
        }
        if self.chunk_len == 0 {
            return Err(ShardError::Config("chunk length must be positive".into()));
        }
        if self.channels == 0 {
            return Err(ShardError::Config("channel count must be positive".into()));
        }
        if self.workers == Some(0) {
            return Err(ShardError::Config("worker count must be positive".into()));
        }
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains(['/', '\\']) {
            return Err(ShardError::Config(format!(
                "invalid container extension '{}'",
                self.extension
            )));
        }
        self.assignment().map(|_| ())
    }

    /// Extension without a leading dot.
    pub fn container_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Split assignment built from the configured identifier sets and policy.
    pub fn assignment(&self) -> Result<SplitAssignment, ShardError> {
        Ok(
            SplitAssignment::new(self.test_ids.iter().cloned(), self.eval_ids.iter().cloned())?
                .with_policy(self.empty_split_policy),
        )
    }

    /// Label encoder for the configured profile.
    pub fn encoder(&self) -> Result<LabelEncoder, ShardError> {
        LabelEncoder::for_profile(self.label_profile)
    }
}
