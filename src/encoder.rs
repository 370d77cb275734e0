//! Streaming Base64 encoder

use crate::error::{Error, Result};
use crate::progress::{CancelToken, ProgressSink, Stage, Tracker};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use tracing::debug;

/// Encodes a byte stream to standard Base64, one chunk at a time.
///
/// At most two input bytes are held back between chunks, so the
/// concatenated output equals a one-shot encode of the whole input and
/// padding only ever appears in [`Encoder::finish`].
#[derive(Debug, Default)]
pub struct Encoder {
    pending: [u8; 3],
    pending_len: usize,
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `chunk`, appending every complete 4-character group to `out`
    pub fn push(&mut self, mut chunk: &[u8], out: &mut String) {
        if self.pending_len > 0 {
            let take = (3 - self.pending_len).min(chunk.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&chunk[..take]);
            self.pending_len += take;
            chunk = &chunk[take..];
            if self.pending_len < 3 {
                return;
            }
            STANDARD.encode_string(self.pending, out);
            self.pending_len = 0;
        }

        let aligned = chunk.len() / 3 * 3;
        STANDARD.encode_string(&chunk[..aligned], out);

        let rest = &chunk[aligned..];
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    /// Flush the held-back bytes, padded
    pub fn finish(&mut self, out: &mut String) {
        if self.pending_len > 0 {
            STANDARD.encode_string(&self.pending[..self.pending_len], out);
            self.pending_len = 0;
        }
    }

    /// Bytes waiting for a complete 3-byte group
    pub fn remainder(&self) -> &[u8] {
        &self.pending[..self.pending_len]
    }
}

/// Stream `reader` to `writer` as Base64.
///
/// `total` is the input size used for `Encoding` progress; `label` names the
/// destination in write errors. Returns the number of characters written.
pub fn encode_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    label: &Path,
    total: u64,
    chunk_size: usize,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut tracker = Tracker::begin(progress, Stage::Encoding, total);
    let mut encoder = Encoder::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut text = String::with_capacity(chunk_size.max(1) / 3 * 4 + 8);
    let mut written = 0u64;

    loop {
        cancel.check()?;
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        };

        text.clear();
        encoder.push(&buffer[..n], &mut text);
        cancel.check()?;
        writer
            .write_all(text.as_bytes())
            .map_err(|e| Error::write(label, e))?;
        written += text.len() as u64;
        tracker.advance(n as u64);
    }

    text.clear();
    encoder.finish(&mut text);
    writer
        .write_all(text.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| Error::write(label, e))?;
    written += text.len() as u64;
    tracker.finish();

    debug!(input = total, output = written, "base64 stream encoded");
    Ok(written)
}
