//! Pipeline configuration

use crate::error::{Error, Result};
use crate::zipper::ArchiveOptions;
use std::path::{Path, PathBuf};

/// Default chunk size for reading sources and streaming the codec (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Tunables shared by the archiver, encoder and decoder
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bytes (or characters) processed per chunk
    pub chunk_size: usize,
    /// Directory for intermediate archives; `None` uses the system temp dir
    pub scratch_dir: Option<PathBuf>,
    /// Deflate level; `None` uses the zip crate's default
    pub compression_level: Option<i32>,
    /// Fail the decode run on a trailing remainder that cannot be decoded
    pub strict_tail: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            scratch_dir: None,
            compression_level: None,
            strict_tail: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = Some(level);
        self
    }

    pub fn with_strict_tail(mut self, strict: bool) -> Self {
        self.strict_tail = strict;
        self
    }

    /// Resolved scratch directory
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Archiver settings derived from this configuration
    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            chunk_size: self.chunk_size,
            compression_level: self.compression_level,
        }
    }

    /// Check the configuration before a run starts
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if let Some(level) = self.compression_level {
            if !(0..=9).contains(&level) {
                return Err(Error::Config(format!(
                    "compression level {} is outside 0..=9",
                    level
                )));
            }
        }
        if let Some(dir) = &self.scratch_dir {
            if !Path::new(dir).is_dir() {
                return Err(Error::Config(format!(
                    "scratch directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}
