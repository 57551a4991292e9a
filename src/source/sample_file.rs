use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use super::{Sample, SampleLoader};
use crate::constants::source::{GZIP_EXTENSION, SAMPLE_FILE_VERSION};
use crate::errors::ShardError;
use crate::transport::fs::write_atomic;

/// On-disk form of one sample inside a source file.
#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct StoredSample {
    shape: Vec<u32>,
    values: Vec<f64>,
    label: String,
}

impl StoredSample {
    fn from_sample(sample: &Sample) -> Result<Self, ShardError> {
        let (height, width, depth) = sample.data.dim();
        let shape = [height, width, depth]
            .into_iter()
            .map(|dim| {
                u32::try_from(dim).map_err(|_| ShardError::ShapeMismatch {
                    context: "sample file".into(),
                    expected: "dimensions that fit in u32".into(),
                    actual: dim.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            shape,
            values: sample.data.iter().copied().collect(),
            label: sample.label.clone(),
        })
    }

    fn into_sample(self) -> Result<Sample, ShardError> {
        // 2-D arrays carry an implicit single channel.
        let shape = match self.shape.as_slice() {
            [height, width] => (*height as usize, *width as usize, 1),
            [height, width, depth] => (*height as usize, *width as usize, *depth as usize),
            other => {
                return Err(ShardError::ShapeMismatch {
                    context: "sample file".into(),
                    expected: "2 or 3 dimensions".into(),
                    actual: format!("{} dimensions", other.len()),
                });
            }
        };
        Sample::from_flat(shape, self.values, self.label)
    }
}

/// Loads source files holding a versioned, bitcode-encoded sample list.
///
/// Files ending in `.gz` are gunzipped first.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitcodeSampleLoader;

impl BitcodeSampleLoader {
    /// Create a loader.
    pub fn new() -> Self {
        Self
    }
}

impl SampleLoader for BitcodeSampleLoader {
    fn load(&self, path: &Path) -> Result<Vec<Sample>, ShardError> {
        let raw = fs::read(path).map_err(ShardError::file(path))?;
        let payload = if is_gzip(path) {
            let mut decoded = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut decoded)?;
            decoded
        } else {
            raw
        };
        match payload.first() {
            Some(&SAMPLE_FILE_VERSION) => {}
            Some(other) => {
                return Err(invalid_data(format!(
                    "unsupported sample file version {other} in '{}'",
                    path.display()
                )));
            }
            None => {
                return Err(invalid_data(format!(
                    "empty sample file '{}'",
                    path.display()
                )));
            }
        }
        let stored: Vec<StoredSample> = bitcode::decode(&payload[1..]).map_err(|err| {
            invalid_data(format!(
                "failed decoding samples from '{}': {err}",
                path.display()
            ))
        })?;
        stored.into_iter().map(StoredSample::into_sample).collect()
    }
}

/// Write `samples` as a source file readable by `BitcodeSampleLoader`.
///
/// The file is gzipped when `path` ends in `.gz`.
pub fn write_sample_file(path: &Path, samples: &[Sample]) -> Result<(), ShardError> {
    let stored = samples
        .iter()
        .map(StoredSample::from_sample)
        .collect::<Result<Vec<_>, _>>()?;
    let mut payload = Vec::new();
    payload.push(SAMPLE_FILE_VERSION);
    payload.extend_from_slice(&bitcode::encode(&stored));
    let bytes = if is_gzip(path) {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        encoder.finish()?
    } else {
        payload
    };
    write_atomic(path, &bytes)
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(GZIP_EXTENSION))
        .unwrap_or(false)
}

fn invalid_data(reason: String) -> ShardError {
    ShardError::Io(io::Error::new(io::ErrorKind::InvalidData, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(seed: f64, label: &str) -> Sample {
        Sample::from_flat(
            (3, 2, 2),
            (0..12).map(|v| seed + f64::from(v) * 0.25).collect(),
            label,
        )
        .unwrap()
    }

    #[test]
    fn plain_and_gzip_files_load_back() {
        let temp = tempdir().unwrap();
        let samples = vec![
            sample(1.0, "texting_activity_step"),
            sample(-3.5, "backpack_activity_step"),
        ];
        for name in ["s1_a.bin", "s1_b.bin.gz"] {
            let path = temp.path().join(name);
            write_sample_file(&path, &samples).unwrap();
            let loaded = BitcodeSampleLoader::new().load(&path).unwrap();
            assert_eq!(loaded, samples, "{name}");
        }
    }

    #[test]
    fn two_dimensional_samples_get_single_channel() {
        let stored = StoredSample {
            shape: vec![2, 3],
            values: vec![0.5; 6],
            label: "x".into(),
        };
        let sample = stored.into_sample().unwrap();
        assert_eq!(sample.data.dim(), (2, 3, 1));
    }

    #[test]
    fn unsupported_rank_is_shape_mismatch() {
        let stored = StoredSample {
            shape: vec![6],
            values: vec![0.5; 6],
            label: "x".into(),
        };
        assert!(matches!(
            stored.into_sample(),
            Err(ShardError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn overflowing_shape_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("s1_a.bin");
        let stored = vec![StoredSample {
            shape: vec![u32::MAX; 3],
            values: Vec::new(),
            label: "texting_activity_step".into(),
        }];
        let mut payload = vec![SAMPLE_FILE_VERSION];
        payload.extend_from_slice(&bitcode::encode(&stored));
        fs::write(&path, payload).unwrap();

        let err = BitcodeSampleLoader::new().load(&path).unwrap_err();
        assert!(matches!(
            err,
            ShardError::ShapeMismatch { ref expected, .. } if expected.contains("overflow")
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("s1_a.bin");
        fs::write(&path, [9u8, 0, 0]).unwrap();
        let err = BitcodeSampleLoader::new().load(&path).unwrap_err();
        assert!(matches!(
            err,
            ShardError::Io(ref io) if io.kind() == io::ErrorKind::InvalidData
        ));
    }
}
