use std::path::{Path, PathBuf};

use crate::splits::SplitLabel;

/// Identity of one container file within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShardName {
    /// Split the shard belongs to.
    pub split: SplitLabel,
    /// 1-based shard index within its chunk.
    pub shard_index: usize,
    /// 1-based chunk index within its split.
    pub chunk_index: usize,
    /// Configured target shard count for the run.
    pub num_shards: usize,
}

impl ShardName {
    /// File name `{split}_{shard:03}_{chunk:03}-{num_shards:03}.{ext}`.
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{}_{:03}_{:03}-{:03}.{}",
            self.split, self.shard_index, self.chunk_index, self.num_shards, extension
        )
    }

    /// Full output path under `dir`.
    pub fn path_in(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(self.file_name(extension))
    }
}

/// Parse a container file name produced by `ShardName::file_name`.
///
/// Returns the shard identity and the extension.
pub fn parse_shard_file_name(name: &str) -> Option<(ShardName, &str)> {
    let (stem, extension) = name.rsplit_once('.')?;
    let (rest, num_shards) = stem.rsplit_once('-')?;
    let (rest, chunk_index) = rest.rsplit_once('_')?;
    let (split, shard_index) = rest.rsplit_once('_')?;
    let shard = ShardName {
        split: split.parse().ok()?,
        shard_index: parse_index(shard_index)?,
        chunk_index: parse_index(chunk_index)?,
        num_shards: parse_index(num_shards)?,
    };
    Some((shard, extension))
}

fn parse_index(raw: &str) -> Option<usize> {
    if raw.len() < 3 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
