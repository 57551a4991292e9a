use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One shard's slice of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSlice {
    /// 1-based shard position within the chunk.
    pub index: usize,
    /// Offset of the first sample in the chunk.
    pub offset: usize,
    /// Number of samples in the shard.
    pub len: usize,
}

impl ShardSlice {
    /// Sample range covered by this shard.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Shard layout for one chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlan {
    /// Shards in write order.
    pub slices: Vec<ShardSlice>,
    /// Samples in every shard, `floor(chunk_size / num_shards)`.
    pub per_shard: usize,
    /// Trailing samples not assigned to any shard.
    pub dropped: usize,
}

impl ShardPlan {
    /// Samples covered by the plan.
    pub fn assigned(&self) -> usize {
        self.slices.iter().map(|slice| slice.len).sum()
    }

    /// True when no shard files will be produced.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

/// Split a chunk of `chunk_size` samples into `num_shards` equal shards.
///
/// Every shard holds `floor(chunk_size / num_shards)` samples; the
/// `chunk_size % num_shards` trailing samples are dropped and reported in
/// `ShardPlan::dropped`. A zero shard count, an empty chunk, or a chunk
/// smaller than the shard count yields an empty plan.
pub fn plan_shards(chunk_size: usize, num_shards: usize) -> ShardPlan {
    if num_shards == 0 || chunk_size == 0 {
        return ShardPlan {
            dropped: chunk_size,
            ..ShardPlan::default()
        };
    }
    let per_shard = chunk_size / num_shards;
    if per_shard == 0 {
        return ShardPlan {
            slices: Vec::new(),
            per_shard,
            dropped: chunk_size,
        };
    }
    let slices = (0..num_shards)
        .map(|idx| ShardSlice {
            index: idx + 1,
            offset: idx * per_shard,
            len: per_shard,
        })
        .collect();
    ShardPlan {
        slices,
        per_shard,
        dropped: chunk_size - per_shard * num_shards,
    }
}
