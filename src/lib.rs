#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Source-file chunking and chunk loading.
pub mod chunking;
/// Command-line front ends shared by the bundled binaries.
pub mod cli;
/// Pipeline configuration.
pub mod config;
/// Centralized constants for labels, splits, framing, and defaults.
pub mod constants;
/// Label encoding profiles.
pub mod labels;
/// Container file naming.
pub mod naming;
/// Split-aware orchestration, progress reporting, and run manifests.
pub mod pipeline;
/// Per-chunk shard sizing.
pub mod planner;
/// Record schema, container framing, and shard writing.
pub mod records;
/// Samples and source loaders.
pub mod source;
/// Subject-level split assignment.
pub mod splits;
/// Filesystem transport: source listing and staged output files.
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Read-only container inspection and decode verification.
pub mod verify;

mod errors;

pub use chunking::{FileChunk, chunk_files, load_chunk};
pub use config::PipelineConfig;
pub use errors::ShardError;
pub use labels::{LabelEncoder, LabelProfile};
pub use naming::{ShardName, parse_shard_file_name};
pub use pipeline::{
    ChunkReport, ProgressObserver, RunReport, ShardPipeline, SplitReport, TracingProgress,
};
pub use planner::{ShardPlan, ShardSlice, plan_shards};
pub use records::{Record, RecordReader, RecordWriter, ShardSummary, write_shard};
pub use source::{BitcodeSampleLoader, InMemoryLoader, Sample, SampleLoader, write_sample_file};
pub use splits::{EmptySplitPolicy, SplitAssignment, SplitLabel, SplitPlan, subject_id};
pub use types::{Extension, LabelCode, LabelName, SubjectId};
pub use verify::{
    ContainerSummary, DecodeOptions, DecodedBatch, DecodedSample, FieldValue, decode, read_all,
    verify_shard,
};
