use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error type for partitioning, chunk loading, record encoding, and verification failures.
#[derive(Debug, Error)]
pub enum ShardError {
    /// Missing or invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
    /// Split assignment is empty or ambiguous where it must not be.
    #[error("partition error: {0}")]
    Partition(String),
    /// A source file in a chunk failed to load.
    #[error("chunk {chunk_index} failed to load '{}': {reason}", path.display())]
    ChunkLoad {
        /// Source file that failed.
        path: PathBuf,
        /// 1-based chunk index within its split.
        chunk_index: usize,
        /// Loader error message.
        reason: String,
    },
    /// Label absent from the active encoding table.
    #[error("unknown label '{0}'")]
    UnknownLabel(String),
    /// Declared and actual dimensions disagree.
    #[error("shape mismatch in {context}: expected {expected}, found {actual}")]
    ShapeMismatch {
        /// Operation that checked the shape.
        context: String,
        /// Shape or count required.
        expected: String,
        /// Shape or count found.
        actual: String,
    },
    /// A sample could not be written to its shard.
    #[error("failed writing sample {sample_index} to '{}': {source}", path.display())]
    Serialization {
        /// Final shard path.
        path: PathBuf,
        /// 0-based sample index within the shard.
        sample_index: usize,
        /// Underlying per-sample failure.
        source: Box<ShardError>,
    },
    /// A container record failed framing, checksum, or layout checks.
    #[error("corrupt record {record_index} in '{}': {reason}", path.display())]
    CorruptRecord {
        /// Container path.
        path: PathBuf,
        /// 0-based record index.
        record_index: usize,
        /// What was wrong with the record.
        reason: String,
    },
    /// I/O failure on a known file.
    #[error("I/O error on '{}': {source}", path.display())]
    File {
        /// File being created, read, synced, or renamed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// I/O failure without file context.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShardError {
    /// Attach shard path and sample index to a per-sample encoding failure.
    ///
    /// Errors that already carry their own location pass through unchanged.
    pub(crate) fn at_sample(self, path: impl Into<PathBuf>, sample_index: usize) -> Self {
        match self {
            Self::Serialization { .. } => self,
            other => Self::Serialization {
                path: path.into(),
                sample_index,
                source: Box::new(other),
            },
        }
    }

    /// Adapter for `map_err` that tags an I/O error with `path`.
    pub(crate) fn file(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::File {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Innermost error, looking through shard-write context wrappers.
    pub fn root_cause(&self) -> &ShardError {
        match self {
            Self::Serialization { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_load_names_file_and_chunk() {
        let err = ShardError::ChunkLoad {
            path: PathBuf::from("/data/abc_001.bin"),
            chunk_index: 3,
            reason: "truncated".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk 3"));
        assert!(msg.contains("/data/abc_001.bin"));
        assert!(msg.contains("truncated"));
    }

    #[test]
    fn at_sample_wraps_unknown_label() {
        let err = ShardError::UnknownLabel("jumping".into()).at_sample("out/train.tfrecord", 7);
        let msg = err.to_string();
        assert!(msg.contains("sample 7"));
        assert!(msg.contains("out/train.tfrecord"));
        assert!(msg.contains("jumping"));
        assert!(matches!(
            err.root_cause(),
            ShardError::UnknownLabel(label) if label == "jumping"
        ));
    }

    #[test]
    fn at_sample_keeps_existing_location() {
        let original = ShardError::UnknownLabel("x".into()).at_sample("a", 1);
        let err = original.at_sample("b", 9);
        assert!(matches!(
            err,
            ShardError::Serialization { sample_index: 1, .. }
        ));
    }

    #[test]
    fn file_errors_name_the_path() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err = ShardError::file(Path::new("/out/train_001_001-001.tfrecord"))(io_err);
        let msg = err.to_string();
        assert!(msg.contains("/out/train_001_001-001.tfrecord"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn io_errors_convert() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: ShardError = io_err.into();
        assert!(matches!(err, ShardError::Io(_)));
        assert!(matches!(err.root_cause(), ShardError::Io(_)));
    }
}
