use std::path::PathBuf;
use tracing::debug;

use crate::errors::ShardError;
use crate::source::{Sample, SampleLoader};

/// Consecutive group of source files processed together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChunk {
    /// 1-based chunk position within its split.
    pub index: usize,
    /// Files in this chunk, in split order.
    pub files: Vec<PathBuf>,
}

/// Group `files` into consecutive chunks of `chunk_len` files.
///
/// The last chunk may be shorter. `chunk_len` must be non-zero.
pub fn chunk_files(files: &[PathBuf], chunk_len: usize) -> Result<Vec<FileChunk>, ShardError> {
    if chunk_len == 0 {
        return Err(ShardError::Config("chunk length must be positive".into()));
    }
    Ok(files
        .chunks(chunk_len)
        .enumerate()
        .map(|(idx, group)| FileChunk {
            index: idx + 1,
            files: group.to_vec(),
        })
        .collect())
}

/// Load every file in `chunk` and concatenate the samples in file order.
///
/// The first file that fails aborts the whole chunk.
pub fn load_chunk<L>(loader: &L, chunk: &FileChunk) -> Result<Vec<Sample>, ShardError>
where
    L: SampleLoader + ?Sized,
{
    let mut samples = Vec::new();
    for path in &chunk.files {
        let loaded = loader.load(path).map_err(|err| ShardError::ChunkLoad {
            path: path.clone(),
            chunk_index: chunk.index,
            reason: err.to_string(),
        })?;
        samples.extend(loaded);
    }
    debug!(
        "[shardprep] loaded chunk {} ({} files, {} samples)",
        chunk.index,
        chunk.files.len(),
        samples.len()
    );
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryLoader;
    use std::path::Path;

    fn paths(count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|idx| PathBuf::from(format!("/src/s{idx:02}_a.bin")))
            .collect()
    }

    fn samples(tag: f64, count: usize) -> Vec<Sample> {
        (0..count)
            .map(|idx| Sample::from_flat((1, 1, 1), vec![tag + idx as f64], "x").unwrap())
            .collect()
    }

    #[test]
    fn chunks_are_consecutive_with_short_tail() {
        let files = paths(7);
        let chunks = chunk_files(&files, 3).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].index, 1);
        assert_eq!(chunks[0].files, files[0..3].to_vec());
        assert_eq!(chunks[2].index, 3);
        assert_eq!(chunks[2].files, files[6..7].to_vec());
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(chunk_files(&[], 5).unwrap().is_empty());
    }

    #[test]
    fn zero_chunk_len_is_rejected() {
        assert!(matches!(
            chunk_files(&paths(2), 0),
            Err(ShardError::Config(_))
        ));
    }

    #[test]
    fn load_concatenates_in_file_order() {
        let files = paths(2);
        let loader = InMemoryLoader::new()
            .with_file(&files[1], samples(100.0, 2))
            .with_file(&files[0], samples(0.0, 3));
        let chunk = FileChunk {
            index: 1,
            files: files.clone(),
        };
        let loaded = load_chunk(&loader, &chunk).unwrap();
        let firsts: Vec<f64> = loaded.iter().map(|s| s.data[[0, 0, 0]]).collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0, 100.0, 101.0]);
    }

    #[test]
    fn load_fails_fast_naming_the_file() {
        let files = paths(3);
        let loader = InMemoryLoader::new()
            .with_file(&files[0], samples(0.0, 1))
            .with_file(&files[2], samples(0.0, 1));
        let chunk = FileChunk {
            index: 4,
            files: files.clone(),
        };
        let err = load_chunk(&loader, &chunk).unwrap_err();
        match err {
            ShardError::ChunkLoad {
                path, chunk_index, ..
            } => {
                assert_eq!(path, Path::new("/src/s01_a.bin"));
                assert_eq!(chunk_index, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
