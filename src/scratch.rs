//! Scratch files for intermediate archives and staged outputs
//!
//! Every file created here is a [`tempfile::NamedTempFile`]: dropping it
//! without an explicit hand-off deletes it, so an early return on error or
//! cancellation leaves nothing behind.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const SCRATCH_PREFIX: &str = ".b64pack-";

/// Allocates scratch files inside one directory
#[derive(Debug, Clone)]
pub struct ScratchStore {
    dir: PathBuf,
}

impl ScratchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// New empty `.zip` scratch file
    pub fn archive(&self) -> Result<ScratchArchive> {
        let file = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(".zip")
            .tempfile_in(&self.dir)
            .map_err(|e| Error::write(&self.dir, e))?;
        debug!(path = %file.path().display(), "scratch archive created");
        Ok(ScratchArchive { file })
    }
}

/// Intermediate archive, deleted on drop unless kept
#[derive(Debug)]
pub struct ScratchArchive {
    file: NamedTempFile,
}

impl ScratchArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Current size on disk
    pub fn len(&self) -> Result<u64> {
        self.file
            .as_file()
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::read(self.path(), e))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewind for reading after it has been written
    pub fn rewind(&mut self) -> Result<&mut File> {
        let path = self.path().to_path_buf();
        let file = self.file.as_file_mut();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::read(path, e))?;
        Ok(file)
    }

    /// Flush to disk and give up ownership; the caller must remove the file
    pub fn keep(self) -> Result<PathBuf> {
        let path = self.path().to_path_buf();
        self.file
            .as_file()
            .sync_all()
            .map_err(|e| Error::write(&path, e))?;
        let (_file, path) = self.file.keep().map_err(|e| Error::write(path, e.error))?;
        debug!(path = %path.display(), "scratch archive handed over");
        Ok(path)
    }
}

/// Output written next to its final destination and moved into place on commit.
///
/// Until [`StagedOutput::commit`] the destination path is untouched.
#[derive(Debug)]
pub struct StagedOutput {
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedOutput {
    pub fn new(destination: impl Into<PathBuf>) -> Result<Self> {
        let destination = destination.into();
        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(".part")
            .tempfile_in(&parent)
            .map_err(|e| Error::write(&destination, e))?;
        debug!(staging = %file.path().display(), destination = %destination.display(), "output staged");
        Ok(Self { file, destination })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn staging_path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Sync and atomically move the staged file onto the destination
    pub fn commit(self) -> Result<PathBuf> {
        self.file
            .as_file()
            .sync_all()
            .map_err(|e| Error::write(&self.destination, e))?;
        self.file
            .persist(&self.destination)
            .map_err(|e| Error::write(&self.destination, e.error))?;
        debug!(path = %self.destination.display(), "output committed");
        Ok(self.destination)
    }
}
