use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::constants::output::STAGING_SUFFIX;
use crate::constants::records::IO_BUFFER_BYTES;
use crate::errors::ShardError;

/// Filesystem listing of source sample files under a root.
pub struct SourceListing {
    root: PathBuf,
    follow_links: bool,
}

impl SourceListing {
    /// Create a listing of the top-level files in `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: false,
        }
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Regular files under the root, sorted by path.
    ///
    /// Directory iteration order is platform dependent, so the result is
    /// always sorted before partitioning.
    pub fn files(&self) -> Result<Vec<PathBuf>, ShardError> {
        if !self.root.is_dir() {
            return Err(ShardError::Config(format!(
                "source directory '{}' does not exist",
                self.root.display()
            )));
        }
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_links);
        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| {
                ShardError::Io(io::Error::other(format!(
                    "failed listing '{}': {err}",
                    self.root.display()
                )))
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Create `dir` and its parents; a no-op when it already exists.
pub fn ensure_dir(dir: &Path) -> Result<(), ShardError> {
    fs::create_dir_all(dir).map_err(|err| {
        ShardError::Config(format!(
            "failed creating directory '{}': {err}",
            dir.display()
        ))
    })
}

/// Output file written to a sibling staging path and renamed into place on commit.
///
/// Dropping without `commit` removes the staging file, so a failed write never
/// leaves anything at the final path.
pub struct StagedFile {
    target: PathBuf,
    staging: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl StagedFile {
    /// Open a staging file for `target`.
    pub fn create(target: impl Into<PathBuf>) -> Result<Self, ShardError> {
        let target = target.into();
        let staging = staging_path(&target);
        let file = File::create(&staging).map_err(ShardError::file(&staging))?;
        Ok(Self {
            target,
            staging,
            writer: Some(BufWriter::with_capacity(IO_BUFFER_BYTES, file)),
        })
    }

    /// Temporary path receiving writes.
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Flush, sync, and rename into place. Returns the final path.
    pub fn commit(mut self) -> Result<PathBuf, ShardError> {
        let result = self.finish();
        if result.is_err() {
            let _ = fs::remove_file(&self.staging);
        }
        result
    }

    fn finish(&mut self) -> Result<PathBuf, ShardError> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|err| ShardError::file(&self.staging)(err.into_error()))?;
            file.sync_all().map_err(ShardError::file(&self.staging))?;
        }
        fs::rename(&self.staging, &self.target).map_err(ShardError::file(&self.target))?;
        Ok(self.target.clone())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already committed"))
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.writer.take().is_some()
            && let Err(err) = fs::remove_file(&self.staging)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(
                "[shardprep] failed removing staging file {}: {err}",
                self.staging.display()
            );
        }
    }
}

/// Staging path used while `target` is being written.
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(STAGING_SUFFIX);
    target.with_file_name(name)
}

/// Write `bytes` to `target` through a staging file.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), ShardError> {
    let mut staged = StagedFile::create(target)?;
    staged
        .write_all(bytes)
        .map_err(ShardError::file(target))?;
    staged.commit()?;
    Ok(())
}
