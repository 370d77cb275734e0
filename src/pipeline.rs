//! Encode and decode runs
//!
//! Both run on the calling thread. They compose the archiver, the codec and
//! the scratch store; the task runner moves them onto a worker thread.
//!
//! ```text
//! encode:  worklist -> zipper -> scratch .zip -> encoder -> staged text -> destination
//! decode:  text file -> decoder -> scratch .zip -> verify -> caller
//! ```

use crate::archive::Worklist;
use crate::config::PipelineConfig;
use crate::decoder::decode_stream;
use crate::encoder::encode_stream;
use crate::error::{Error, Result};
use crate::progress::{CancelToken, ProgressSink};
use crate::scratch::{ScratchStore, StagedOutput};
use crate::zipper::{verify_archive, write_archive};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Archive `worklist`, encode it, and write the text to `destination`.
///
/// On any error, including cancellation, the scratch archive is removed and
/// `destination` is not created.
pub fn encode_to_file(
    worklist: &Worklist,
    destination: &Path,
    config: &PipelineConfig,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<PathBuf> {
    config.validate()?;
    info!(
        files = worklist.len(),
        bytes = worklist.total_bytes(),
        destination = %destination.display(),
        "encode started"
    );

    let store = ScratchStore::new(config.scratch_dir());
    let mut scratch = store.archive()?;
    let options = config.archive_options();
    let scratch_path = scratch.path().to_path_buf();
    write_archive(
        worklist.items(),
        BufWriter::new(scratch.file_mut()),
        &scratch_path,
        worklist.total_bytes(),
        &options,
        progress,
        cancel,
    )?
    .flush()
    .map_err(|e| Error::write(&scratch_path, e))?;

    let archive_len = scratch.len()?;
    let mut staged = StagedOutput::new(destination)?;
    let written = {
        let reader = BufReader::new(scratch.rewind()?);
        let writer = BufWriter::new(staged.file_mut());
        encode_stream(
            reader,
            writer,
            destination,
            archive_len,
            config.chunk_size,
            progress,
            cancel,
        )?
    };
    cancel.check()?;

    let path = staged.commit()?;
    info!(
        archive_bytes = archive_len,
        text_bytes = written,
        destination = %path.display(),
        "encode finished"
    );
    Ok(path)
}

/// Decode the Base64 text in `source` into a scratch archive and validate it.
///
/// The returned path belongs to the caller, who must remove it. On any
/// error, including cancellation, nothing is left in the scratch directory.
pub fn decode_to_scratch(
    source: &Path,
    config: &PipelineConfig,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<PathBuf> {
    config.validate()?;
    let input = File::open(source).map_err(|e| Error::read(source, e))?;
    let total = input
        .metadata()
        .map(|m| m.len())
        .map_err(|e| Error::read(source, e))?;
    info!(source = %source.display(), bytes = total, "decode started");

    let store = ScratchStore::new(config.scratch_dir());
    let mut scratch = store.archive()?;
    let scratch_path = scratch.path().to_path_buf();
    decode_stream(
        BufReader::new(input),
        BufWriter::new(scratch.file_mut()),
        &scratch_path,
        total,
        config.chunk_size,
        config.strict_tail,
        progress,
        cancel,
    )?;

    let entries = verify_archive(&scratch_path, progress, cancel)?;
    cancel.check()?;

    let path = scratch.keep()?;
    info!(archive = %path.display(), entries, "decode finished");
    Ok(path)
}
