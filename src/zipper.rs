//! Streaming ZIP archiver and container validation

use crate::archive::WorkItem;
use crate::error::{Error, Result};
use crate::progress::{CancelToken, ProgressSink, Stage, Tracker};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Sizes at or above this need ZIP64 extra fields
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Options for the archiver
#[derive(Debug, Clone, Copy)]
pub struct ArchiveOptions {
    pub chunk_size: usize,
    pub compression_level: Option<i32>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            compression_level: None,
        }
    }
}

impl ArchiveOptions {
    fn file_options(&self, size: u64) -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.compression_level)
            .large_file(size >= ZIP64_THRESHOLD)
    }
}

/// Write every work item into a new ZIP archive on `sink`, chunk by chunk.
///
/// `label` names the sink in error messages. `total_bytes` scales the
/// `Compressing` progress. The finished sink is handed back so the caller can
/// rewind and read it.
pub fn write_archive<W: Write + Seek>(
    items: &[WorkItem],
    sink: W,
    label: &Path,
    total_bytes: u64,
    options: &ArchiveOptions,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<W> {
    let mut tracker = Tracker::begin(progress, Stage::Compressing, total_bytes);
    let mut writer = ZipWriter::new(sink);
    let mut buffer = vec![0u8; options.chunk_size.max(1)];

    for item in items {
        cancel.check()?;
        append_item(&mut writer, item, label, options, &mut buffer, &mut tracker, cancel)?;
    }

    let sink = writer.finish().map_err(|e| Error::zip(label, e))?;
    tracker.finish();
    info!(entries = items.len(), bytes = total_bytes, "archive written");
    Ok(sink)
}

fn append_item<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    item: &WorkItem,
    label: &Path,
    options: &ArchiveOptions,
    buffer: &mut [u8],
    tracker: &mut Tracker<'_>,
    cancel: &CancelToken,
) -> Result<()> {
    let meta = std::fs::metadata(&item.source).map_err(|e| Error::read(&item.source, e))?;
    if meta.is_dir() {
        debug!(path = %item.source.display(), "skipping directory");
        return Ok(());
    }

    let mut source = File::open(&item.source).map_err(|e| Error::read(&item.source, e))?;
    writer
        .start_file(item.entry_name.as_str(), options.file_options(meta.len()))
        .map_err(|e| Error::zip(label, e))?;
    debug!(entry = %item.entry_name, size = meta.len(), "adding entry");

    loop {
        cancel.check()?;
        let n = match source.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::read(&item.source, e)),
        };
        cancel.check()?;
        writer
            .write_all(&buffer[..n])
            .map_err(|e| Error::write(label, e))?;
        tracker.advance(n as u64);
    }
    Ok(())
}

/// Build an archive entirely in memory, for payloads small enough to hold
pub fn archive_to_vec(items: &[WorkItem], options: &ArchiveOptions) -> Result<Vec<u8>> {
    let total = items
        .iter()
        .filter_map(|i| std::fs::metadata(&i.source).ok())
        .map(|m| m.len())
        .sum();
    let cursor = write_archive(
        items,
        std::io::Cursor::new(Vec::new()),
        Path::new("<memory>"),
        total,
        options,
        &crate::progress::NoProgress,
        &CancelToken::new(),
    )?;
    Ok(cursor.into_inner())
}

/// Confirm that `path` holds a well-formed ZIP container.
///
/// Reads the central directory, then each entry's local header. Returns the
/// number of entries.
pub fn verify_archive(
    path: &Path,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<usize> {
    let mut tracker = Tracker::begin(progress, Stage::Validating, 0);
    let file = File::open(path).map_err(|e| Error::read(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| not_an_archive(path, e))?;
    let count = archive.len();
    tracker.set_total(count as u64);

    for index in 0..count {
        cancel.check()?;
        archive.by_index(index).map_err(|e| not_an_archive(path, e))?;
        tracker.advance(1);
    }

    debug!(path = %path.display(), entries = count, "archive verified");
    Ok(count)
}

fn not_an_archive(path: &Path, err: zip::result::ZipError) -> Error {
    let reason = match err {
        zip::result::ZipError::Io(e) => e.to_string(),
        other => other.to_string(),
    };
    Error::NotAnArchive {
        path: path.to_path_buf(),
        reason,
    }
}
