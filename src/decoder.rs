//! Streaming Base64 decoder

use crate::error::{Error, Result};
use crate::progress::{CancelToken, ProgressSink, Stage, Tracker};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

pub(crate) const PAD: u8 = b'=';

/// Standard alphabet, padding optional, trailing bits ignored
pub(crate) const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

pub(crate) fn is_base64_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/' || byte == PAD
}

/// Decodes Base64 text one chunk at a time.
///
/// Bytes outside the Base64 alphabet (line breaks, spaces, stray symbols)
/// are dropped before alignment. Up to three characters are held back
/// between chunks. A padded group in the middle of the stream is accepted,
/// so concatenated Base64 documents decode back to back.
#[derive(Debug, Default)]
pub struct Decoder {
    pending: Vec<u8>,
    /// Alphabet characters accepted so far, used as the error offset
    position: u64,
    strict_tail: bool,
}

impl Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail in [`Decoder::finish`] when the trailing remainder cannot be decoded
    pub fn with_strict_tail(mut self, strict: bool) -> Self {
        self.strict_tail = strict;
        self
    }

    /// Decode `chunk`, appending decoded bytes for every complete group to `out`
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending
            .extend(chunk.iter().copied().filter(|b| is_base64_char(*b)));

        let aligned = self.pending.len() / 4 * 4;
        if aligned == 0 {
            return Ok(());
        }

        let body: Vec<u8> = self.pending.drain(..aligned).collect();
        self.decode_aligned(&body, out)?;
        self.position += aligned as u64;
        Ok(())
    }

    /// Decode the held-back tail.
    ///
    /// An undecodable tail is logged and dropped unless strict mode is on.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let tail = std::mem::take(&mut self.pending);
        match LENIENT.decode_vec(&tail, out) {
            Ok(()) => {
                self.position += tail.len() as u64;
                Ok(())
            }
            Err(source) if self.strict_tail => Err(Error::Decode {
                offset: self.position,
                source,
            }),
            Err(e) => {
                warn!(
                    offset = self.position,
                    tail = %String::from_utf8_lossy(&tail),
                    error = %e,
                    "ignoring undecodable base64 tail"
                );
                Ok(())
            }
        }
    }

    /// Characters waiting for a complete 4-character group
    pub fn remainder(&self) -> &[u8] {
        &self.pending
    }

    fn decode_aligned(&self, body: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if !body.contains(&PAD) {
            return self.decode_run(body, 0, out);
        }

        // Padded groups cannot sit inside a larger decode call; split around them.
        let mut run_start = 0;
        for (i, group) in body.chunks_exact(4).enumerate() {
            if group.contains(&PAD) {
                let start = i * 4;
                self.decode_run(&body[run_start..start], run_start, out)?;
                self.decode_run(group, start, out)?;
                run_start = start + 4;
            }
        }
        self.decode_run(&body[run_start..], run_start, out)
    }

    fn decode_run(&self, run: &[u8], offset: usize, out: &mut Vec<u8>) -> Result<()> {
        if run.is_empty() {
            return Ok(());
        }
        LENIENT.decode_vec(run, out).map_err(|source| Error::Decode {
            offset: self.position + offset as u64,
            source,
        })
    }
}

/// Stream Base64 text from `reader` to `writer` as raw bytes.
///
/// `total` is the input size used for `Decoding` progress; `label` names the
/// destination in write errors. Returns the number of bytes written.
#[allow(clippy::too_many_arguments)]
pub fn decode_stream<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    label: &Path,
    total: u64,
    chunk_size: usize,
    strict_tail: bool,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut tracker = Tracker::begin(progress, Stage::Decoding, total);
    let mut decoder = Decoder::new().with_strict_tail(strict_tail);
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut bytes = Vec::with_capacity(chunk_size.max(1) / 4 * 3 + 3);
    let mut written = 0u64;

    loop {
        cancel.check()?;
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        };

        bytes.clear();
        decoder.push(&buffer[..n], &mut bytes)?;
        cancel.check()?;
        writer.write_all(&bytes).map_err(|e| Error::write(label, e))?;
        written += bytes.len() as u64;
        tracker.advance(n as u64);
    }

    bytes.clear();
    decoder.finish(&mut bytes)?;
    writer
        .write_all(&bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| Error::write(label, e))?;
    written += bytes.len() as u64;
    tracker.finish();

    debug!(input = total, output = written, "base64 stream decoded");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, ProgressLog};
    use base64::engine::general_purpose::STANDARD;
    use std::io::Cursor;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 17 % 256) as u8).collect()
    }

    fn decode_with(text: &[u8], chunk_size: usize, strict: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        decode_stream(
            Cursor::new(text),
            &mut out,
            Path::new("mem"),
            text.len() as u64,
            chunk_size,
            strict,
            &NoProgress,
            &CancelToken::new(),
        )?;
        Ok(out)
    }

    #[test]
    fn test_decode_matches_one_shot() {
        for len in [0usize, 1, 2, 3, 4, 100, 4097] {
            let data = sample(len);
            let text = STANDARD.encode(&data);
            for chunk in [1, 3, 4, 5, 1024, text.len() + 1] {
                assert_eq!(decode_with(text.as_bytes(), chunk, false).unwrap(), data);
            }
        }
    }

    #[test]
    fn test_trailing_whitespace_is_tolerated() {
        let data = sample(31);
        let text = STANDARD.encode(&data);
        for suffix in ["\n", " ", "\r\n", " \n\t"] {
            let input = format!("{}{}", text, suffix);
            assert_eq!(decode_with(input.as_bytes(), 7, true).unwrap(), data);
        }
    }

    #[test]
    fn test_wrapped_lines_are_tolerated() {
        let data = sample(200);
        let text = STANDARD.encode(&data);
        let wrapped: String = text
            .as_bytes()
            .chunks(76)
            .map(|line| format!("{}\n", std::str::from_utf8(line).unwrap()))
            .collect();
        assert_eq!(decode_with(wrapped.as_bytes(), 10, false).unwrap(), data);
    }

    #[test]
    fn test_unpadded_tail_decodes() {
        let text = STANDARD.encode(b"hello");
        let unpadded = text.trim_end_matches('=');
        assert_eq!(decode_with(unpadded.as_bytes(), 4, true).unwrap(), b"hello");
    }

    #[test]
    fn test_single_char_tail_swallowed_unless_strict() {
        let mut text = STANDARD.encode(b"abc").into_bytes();
        text.push(b'Q');
        assert_eq!(decode_with(&text, 2, false).unwrap(), b"abc");

        let err = decode_with(&text, 2, true).unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 4, .. }));
    }

    #[test]
    fn test_padding_inside_group_fails() {
        assert!(decode_with(b"QUJD", 4, false).is_ok());

        let err = decode_with(b"QUJDQ=JD", 8, false).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_error_offset_skips_line_breaks() {
        let err = decode_with(b"QUJD\r\nQ=JD", 16, false).unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 4, .. }));
        assert!(err.to_string().contains("base64 character 4"));
    }

    #[test]
    fn test_concatenated_documents_decode() {
        let text = format!("{}{}", STANDARD.encode(b"a"), STANDARD.encode(b"bc"));
        assert_eq!(decode_with(text.as_bytes(), 3, false).unwrap(), b"abc");
    }

    #[test]
    fn test_remainder_never_exceeds_three_chars() {
        let mut decoder = Decoder::new();
        let mut out = Vec::new();
        for piece in [&b"QU"[..], b"J", b"DRE", b"VG", b"\n"] {
            decoder.push(piece, &mut out).unwrap();
            assert!(decoder.remainder().len() <= 3);
        }
        decoder.finish(&mut out).unwrap();
        assert_eq!(out, b"ABCDEF");
    }

    #[test]
    fn test_progress_counts_input_characters() {
        let text = STANDARD.encode(sample(300));
        let log = ProgressLog::new();
        decode_stream(
            Cursor::new(text.as_bytes()),
            std::io::sink(),
            Path::new("mem"),
            text.len() as u64,
            100,
            false,
            &log,
            &CancelToken::new(),
        )
        .unwrap();

        let events = log.events_for(Stage::Decoding);
        assert!(events.windows(2).all(|w| w[0].current <= w[1].current));
        assert_eq!(events.last().unwrap().current, text.len() as u64);
    }
}
