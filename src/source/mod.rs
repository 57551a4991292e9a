//! Sample types and the loader seam for per-subject source files.
//!
//! The pipeline treats each source file as an opaque, ordered list of
//! samples. `SampleLoader` is the only way the core reads source data, so
//! alternative on-disk formats plug in without touching chunking or writing.

use ndarray::Array3;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::ShardError;
use crate::types::LabelName;

/// Bitcode-encoded (optionally gzipped) sample files.
pub mod sample_file;

pub use sample_file::{BitcodeSampleLoader, write_sample_file};

/// One labeled `height × width × depth` sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Sample values in row-major `(height, width, depth)` order.
    pub data: Array3<f64>,
    /// Label name, encoded by the active label profile at write time.
    pub label: LabelName,
}

impl Sample {
    /// Wrap an existing array.
    pub fn new(data: Array3<f64>, label: impl Into<LabelName>) -> Self {
        Self {
            data,
            label: label.into(),
        }
    }

    /// Build a sample from row-major values.
    pub fn from_flat(
        shape: (usize, usize, usize),
        values: Vec<f64>,
        label: impl Into<LabelName>,
    ) -> Result<Self, ShardError> {
        let got = values.len();
        let data = Array3::from_shape_vec(shape, values).map_err(|_| {
            let count = shape
                .0
                .checked_mul(shape.1)
                .and_then(|count| count.checked_mul(shape.2))
                .map(|count| count.to_string())
                .unwrap_or_else(|| "overflow".to_string());
            ShardError::ShapeMismatch {
                context: "sample construction".into(),
                expected: format!("{}x{}x{} = {count} values", shape.0, shape.1, shape.2),
                actual: format!("{got} values"),
            }
        })?;
        Ok(Self::new(data, label))
    }

    /// First array dimension.
    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// Second array dimension.
    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    /// Channel depth.
    pub fn depth(&self) -> usize {
        self.data.dim().2
    }
}

/// Deserializes one source file into its ordered samples.
///
/// Implementations must be deterministic for unchanged input files.
pub trait SampleLoader: Send + Sync {
    /// Load every sample in `path`, preserving file order.
    fn load(&self, path: &Path) -> Result<Vec<Sample>, ShardError>;
}

impl<L: SampleLoader + ?Sized> SampleLoader for Arc<L> {
    fn load(&self, path: &Path) -> Result<Vec<Sample>, ShardError> {
        (**self).load(path)
    }
}

/// Loader backed by an in-memory path → samples map.
///
/// Paths that were never inserted fail with `NotFound`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLoader {
    files: HashMap<PathBuf, Arc<Vec<Sample>>>,
}

impl InMemoryLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `samples` under `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, samples: Vec<Sample>) {
        self.files.insert(path.into(), Arc::new(samples));
    }

    /// Builder form of `insert`.
    pub fn with_file(mut self, path: impl Into<PathBuf>, samples: Vec<Sample>) -> Self {
        self.insert(path, samples);
        self
    }
}

impl SampleLoader for InMemoryLoader {
    fn load(&self, path: &Path) -> Result<Vec<Sample>, ShardError> {
        self.files
            .get(path)
            .map(|samples| samples.as_ref().clone())
            .ok_or_else(|| {
                ShardError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no in-memory samples for '{}'", path.display()),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flat_checks_length() {
        let sample = Sample::from_flat((2, 3, 1), vec![0.0; 6], "texting_activity_step").unwrap();
        assert_eq!((sample.height(), sample.width(), sample.depth()), (2, 3, 1));

        let err = Sample::from_flat((2, 3, 1), vec![0.0; 5], "x").unwrap_err();
        assert!(matches!(err, ShardError::ShapeMismatch { ref actual, .. } if actual == "5 values"));
    }

    #[test]
    fn from_flat_is_row_major() {
        let sample = Sample::from_flat((2, 2, 2), (0..8).map(f64::from).collect(), "x").unwrap();
        assert_eq!(sample.data[[0, 0, 1]], 1.0);
        assert_eq!(sample.data[[0, 1, 0]], 2.0);
        assert_eq!(sample.data[[1, 0, 0]], 4.0);
    }

    #[test]
    fn in_memory_loader_misses_are_not_found() {
        let loader = InMemoryLoader::new().with_file(
            "/a_1.bin",
            vec![Sample::from_flat((1, 1, 1), vec![1.0], "x").unwrap()],
        );
        assert_eq!(loader.load(Path::new("/a_1.bin")).unwrap().len(), 1);
        let err = loader.load(Path::new("/b_1.bin")).unwrap_err();
        assert!(matches!(err, ShardError::Io(ref io) if io.kind() == io::ErrorKind::NotFound));
    }
}
