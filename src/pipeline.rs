//! Orchestrates partition, chunk loading, shard planning and shard writing.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunking::{FileChunk, chunk_files, load_chunk};
use crate::config::PipelineConfig;
use crate::constants::output::MANIFEST_FILENAME;
use crate::errors::ShardError;
use crate::labels::{LabelEncoder, LabelProfile};
use crate::naming::ShardName;
use crate::planner::plan_shards;
use crate::records::{ShardSummary, write_shard};
use crate::source::SampleLoader;
use crate::splits::{SplitAssignment, SplitLabel, SplitPlan};
use crate::transport::fs::{SourceListing, ensure_dir, write_atomic};

/// Receives chunk completion events from pipeline workers.
///
/// Called from worker threads, possibly out of chunk order.
pub trait ProgressObserver: Send + Sync {
    /// A chunk of `split` finished writing all of its shards.
    fn on_chunk_complete(&self, split: SplitLabel, chunk_index: usize, total_chunks: usize);
}

/// Default observer that reports progress through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_chunk_complete(&self, split: SplitLabel, chunk_index: usize, total_chunks: usize) {
        info!(
            "[shardprep] {} chunk {}/{} complete",
            split, chunk_index, total_chunks
        );
    }
}

/// Outcome of one chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReport {
    /// 1-based chunk index within the split.
    pub chunk_index: usize,
    /// Source files in the chunk.
    pub files: usize,
    /// Samples loaded from those files.
    pub samples: usize,
    /// Samples written to shards.
    pub written: usize,
    /// Trailing samples not assigned to any shard.
    pub dropped: usize,
    /// Shards written, in shard order.
    pub shards: Vec<ShardSummary>,
}

/// Outcome of one split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReport {
    /// Split processed.
    pub split: SplitLabel,
    /// Source files assigned to the split.
    pub files: usize,
    /// Per-chunk results in chunk order.
    pub chunks: Vec<ChunkReport>,
}

impl SplitReport {
    /// Samples written across all chunks.
    pub fn written(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.written).sum()
    }

    /// Samples dropped across all chunks.
    pub fn dropped(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.dropped).sum()
    }

    /// Shard files written across all chunks.
    pub fn shard_count(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.shards.len()).sum()
    }
}

/// Outcome of a full run; serialized as the run manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Label profile used to encode records.
    pub label_profile: LabelProfile,
    /// Channel depth written into every record.
    pub channels: u32,
    /// Source files per chunk.
    pub chunk_len: usize,
    /// Target shards per chunk.
    pub num_shards: usize,
    /// Per-split results in train, test, evaluation order.
    pub splits: Vec<SplitReport>,
}

impl RunReport {
    /// Report for `split`, if it was processed.
    pub fn split(&self, split: SplitLabel) -> Option<&SplitReport> {
        self.splits.iter().find(|report| report.split == split)
    }

    /// Samples written across all splits.
    pub fn written(&self) -> usize {
        self.splits.iter().map(SplitReport::written).sum()
    }

    /// Samples dropped across all splits.
    pub fn dropped(&self) -> usize {
        self.splits.iter().map(SplitReport::dropped).sum()
    }

    /// All shard summaries in run order.
    pub fn shards(&self) -> impl Iterator<Item = &ShardSummary> {
        self.splits
            .iter()
            .flat_map(|split| split.chunks.iter())
            .flat_map(|chunk| chunk.shards.iter())
    }
}

/// Split-aware shard writer over a bounded worker pool.
///
/// Chunks of a split run in parallel; each chunk's shards are written in
/// order by the worker that loaded it. The first failing chunk stops
/// scheduling of further chunks and its error is returned.
pub struct ShardPipeline<L> {
    config: PipelineConfig,
    loader: L,
    encoder: LabelEncoder,
    assignment: SplitAssignment,
    observer: Arc<dyn ProgressObserver>,
    pool: ThreadPool,
}

impl<L: SampleLoader> ShardPipeline<L> {
    /// Validate `config` and prepare the worker pool.
    pub fn new(config: PipelineConfig, loader: L) -> Result<Self, ShardError> {
        config.validate()?;
        let encoder = config.encoder()?;
        let assignment = config.assignment()?;
        let mut builder = ThreadPoolBuilder::new().thread_name(|idx| format!("shardprep-{idx}"));
        if let Some(workers) = config.workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|err| ShardError::Config(format!("failed to start worker pool: {err}")))?;
        Ok(Self {
            config,
            loader,
            encoder,
            assignment,
            observer: Arc::new(TracingProgress),
            pool,
        })
    }

    /// Replace the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Active label encoder.
    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    /// Sorted source listing partitioned into all three splits.
    pub fn plan(&self) -> Result<SplitPlan, ShardError> {
        let files = self.source_files()?;
        self.assignment.partition_all(&files)
    }

    /// Process every split and write the manifest when enabled.
    pub fn run(&self) -> Result<RunReport, ShardError> {
        ensure_dir(&self.config.output_dir)?;
        let plan = self.plan()?;
        info!(
            "[shardprep] partitioned {} source files from {}",
            plan.total_files(),
            self.config.source_dir.display()
        );
        let mut splits = Vec::new();
        for (split, files) in plan.iter() {
            splits.push(self.process_split(split, files)?);
        }
        let report = RunReport {
            label_profile: self.config.label_profile,
            channels: self.config.channels,
            chunk_len: self.config.chunk_len,
            num_shards: self.config.num_shards,
            splits,
        };
        if self.config.write_manifest {
            self.write_manifest(&report)?;
        }
        info!(
            "[shardprep] run complete: {} samples written, {} dropped, {} shards",
            report.written(),
            report.dropped(),
            report.shards().count()
        );
        Ok(report)
    }

    /// Process one split on its own.
    pub fn run_split(&self, split: SplitLabel) -> Result<SplitReport, ShardError> {
        ensure_dir(&self.config.output_dir)?;
        let files = self.source_files()?;
        let split_files = self.assignment.partition(&files, split)?;
        self.process_split(split, &split_files)
    }

    fn source_files(&self) -> Result<Vec<PathBuf>, ShardError> {
        SourceListing::new(&self.config.source_dir)
            .with_follow_symlinks(self.config.follow_links)
            .files()
    }

    fn process_split(&self, split: SplitLabel, files: &[PathBuf]) -> Result<SplitReport, ShardError> {
        let chunks = chunk_files(files, self.config.chunk_len)?;
        let total_chunks = chunks.len();
        info!(
            "[shardprep] {}: {} files in {} chunks",
            split,
            files.len(),
            total_chunks
        );
        let reports = self.pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| {
                    let report = self.process_chunk(split, chunk)?;
                    self.observer
                        .on_chunk_complete(split, chunk.index, total_chunks);
                    Ok(report)
                })
                .collect::<Result<Vec<_>, ShardError>>()
        })?;
        let report = SplitReport {
            split,
            files: files.len(),
            chunks: reports,
        };
        if report.dropped() > 0 {
            warn!(
                "[shardprep] {}: {} trailing samples not assigned to any shard",
                split,
                report.dropped()
            );
        }
        Ok(report)
    }

    fn process_chunk(&self, split: SplitLabel, chunk: &FileChunk) -> Result<ChunkReport, ShardError> {
        let samples = load_chunk(&self.loader, chunk)?;
        let plan = plan_shards(samples.len(), self.config.num_shards);
        debug!(
            "[shardprep] {} chunk {}: {} samples, {} per shard, {} dropped",
            split,
            chunk.index,
            samples.len(),
            plan.per_shard,
            plan.dropped
        );
        let mut shards = Vec::with_capacity(plan.slices.len());
        for slice in &plan.slices {
            let name = ShardName {
                split,
                shard_index: slice.index,
                chunk_index: chunk.index,
                num_shards: self.config.num_shards,
            };
            let path = name.path_in(&self.config.output_dir, self.config.container_extension());
            shards.push(write_shard(
                &samples[slice.range()],
                &path,
                self.config.channels,
                &self.encoder,
            )?);
        }
        Ok(ChunkReport {
            chunk_index: chunk.index,
            files: chunk.files.len(),
            samples: samples.len(),
            written: plan.assigned(),
            dropped: plan.dropped,
            shards,
        })
    }

    fn write_manifest(&self, report: &RunReport) -> Result<(), ShardError> {
        let path = manifest_path(&self.config.output_dir);
        let mut bytes = serde_json::to_vec_pretty(report).map_err(io::Error::from)?;
        bytes.push(b'\n');
        write_atomic(&path, &bytes)?;
        debug!("[shardprep] wrote manifest {}", path.display());
        Ok(())
    }
}

/// Location of the run manifest inside `output_dir`.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}
