//! Read-only inspection and decode-time verification of container files.

use ndarray::{Array1, Array3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::verify::{DEFAULT_BATCH_SIZE, DEFAULT_SHUFFLE_SEED};
use crate::errors::ShardError;
use crate::labels::LabelEncoder;
use crate::records::{Record, RecordReader, ShardSummary};
use crate::types::LabelCode;

/// One field of a raw record, as reported by `read_all`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Unsigned dimension field.
    U32(u32),
    /// Signed label field.
    I32(i32),
    /// Raw byte field.
    Bytes(Vec<u8>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U32(value) => write!(f, "{value}"),
            Self::I32(value) => write!(f, "{value}"),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Record count and first-record fields of a container.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ContainerSummary {
    /// Number of records in the file.
    pub count: usize,
    /// Fields of the first record, keyed by schema name.
    pub first: Option<BTreeMap<String, FieldValue>>,
}

fn record_fields(record: &Record) -> BTreeMap<String, FieldValue> {
    BTreeMap::from([
        ("height".to_string(), FieldValue::U32(record.height)),
        ("width".to_string(), FieldValue::U32(record.width)),
        ("depth".to_string(), FieldValue::U32(record.depth)),
        ("label".to_string(), FieldValue::I32(record.label)),
        ("raw_bytes".to_string(), FieldValue::Bytes(record.raw.clone())),
    ])
}

/// Count the records in `path` and report the first record's fields.
pub fn read_all(path: &Path) -> Result<ContainerSummary, ShardError> {
    let mut summary = ContainerSummary::default();
    for record in RecordReader::open(path)? {
        let record = record?;
        if summary.first.is_none() {
            summary.first = Some(record_fields(&record));
        }
        summary.count += 1;
    }
    Ok(summary)
}

/// One decoded sample: the reshaped array and its one-hot label.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedSample {
    /// Array of shape `(height, width, depth)`.
    pub array: Array3<f64>,
    /// One-hot label of width `K`.
    pub one_hot: Array1<f32>,
    /// Label code the one-hot vector was built from.
    pub label: LabelCode,
}

/// Consecutive group of decoded samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedBatch {
    /// Samples in batch order.
    pub samples: Vec<DecodedSample>,
}

impl DecodedBatch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Batching and ordering for `decode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Samples per batch; the last batch may be shorter.
    pub batch_size: usize,
    /// Shuffle samples before batching.
    pub shuffle: bool,
    /// Seed for the shuffle.
    pub seed: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle: false,
            seed: DEFAULT_SHUFFLE_SEED,
        }
    }
}

/// Reverse the writer schema for one record.
pub fn decode_record(record: &Record, encoder: &LabelEncoder) -> Result<DecodedSample, ShardError> {
    let shape = (
        record.height as usize,
        record.width as usize,
        record.depth as usize,
    );
    let values = record.values();
    let value_count = values.len();
    let array = Array3::from_shape_vec(shape, values).map_err(|_| ShardError::ShapeMismatch {
        context: "record decode".into(),
        expected: format!("{}x{}x{}", shape.0, shape.1, shape.2),
        actual: format!("{value_count} values"),
    })?;
    Ok(DecodedSample {
        array,
        one_hot: encoder.one_hot(record.label)?,
        label: record.label,
    })
}

/// Decode every record in `path` into batches.
///
/// With `shuffle` set, samples are permuted with a `StdRng` seeded from
/// `options.seed` before batching, so repeated runs see the same order.
pub fn decode(
    path: &Path,
    encoder: &LabelEncoder,
    options: DecodeOptions,
) -> Result<Vec<DecodedBatch>, ShardError> {
    if options.batch_size == 0 {
        return Err(ShardError::Config("batch size must be positive".into()));
    }
    let mut samples = RecordReader::open(path)?
        .map(|record| decode_record(&record?, encoder))
        .collect::<Result<Vec<_>, _>>()?;
    if options.shuffle {
        let mut rng = StdRng::seed_from_u64(options.seed);
        samples.shuffle(&mut rng);
    }

    let mut batches = Vec::with_capacity(samples.len().div_ceil(options.batch_size));
    let mut iter = samples.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(DecodedBatch {
            samples: iter.by_ref().take(options.batch_size).collect(),
        });
    }
    debug!(
        "[shardprep] decoded {} batches from {}",
        batches.len(),
        path.display()
    );
    Ok(batches)
}

/// Check that `path` holds exactly `expected_records` decodable records.
///
/// Every record must reshape to its declared dimensions and carry a label
/// code inside the encoder's table.
pub fn verify_shard(
    path: &Path,
    expected_records: usize,
    encoder: &LabelEncoder,
) -> Result<ShardSummary, ShardError> {
    let mut records = 0;
    for record in RecordReader::open(path)? {
        decode_record(&record?, encoder)?;
        records += 1;
    }
    if records != expected_records {
        return Err(ShardError::ShapeMismatch {
            context: format!("record count of '{}'", path.display()),
            expected: expected_records.to_string(),
            actual: records.to_string(),
        });
    }
    Ok(ShardSummary {
        path: PathBuf::from(path),
        records,
        bytes: fs::metadata(path).map_err(ShardError::file(path))?.len(),
    })
}
