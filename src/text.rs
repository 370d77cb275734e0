//! In-memory helpers for short payloads

use crate::archive::Worklist;
use crate::decoder::{is_base64_char, LENIENT, PAD};
use crate::error::Result;
use crate::zipper::{archive_to_vec, ArchiveOptions};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode UTF-8 text as standard Base64
pub fn encode_text(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode Base64 back to text.
///
/// Bytes outside the Base64 alphabet are skipped and anything after the
/// padding that closes the last group is ignored. Input that ends inside an
/// unpadded group yields an empty string, and byte sequences that are not
/// UTF-8 are dropped.
pub fn decode_text(encoded: &str) -> String {
    let body = match padded_body(encoded.as_bytes()) {
        Some(body) => body,
        None => return String::new(),
    };
    match LENIENT.decode(body) {
        Ok(bytes) => utf8_ignoring_errors(&bytes),
        Err(_) => String::new(),
    }
}

/// Alphabet characters up to the closing padding, `None` if the padding is missing
fn padded_body(input: &[u8]) -> Option<Vec<u8>> {
    let mut body = Vec::with_capacity(input.len());
    let mut pads = 0;
    for &byte in input.iter().filter(|b| is_base64_char(**b)) {
        if byte != PAD {
            body.push(byte);
            continue;
        }
        pads += 1;
        let group_pos = body.len() % 4;
        if group_pos >= 2 && group_pos + pads >= 4 {
            return Some(body);
        }
    }
    (body.len() % 4 == 0).then_some(body)
}

fn utf8_ignoring_errors(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(rest.len());
                bytes = &rest[skip..];
            }
        }
    }
}

/// Archive the worklist in memory and return its Base64 text
pub fn encode_worklist(worklist: &Worklist, options: &ArchiveOptions) -> Result<String> {
    let bytes = archive_to_vec(worklist.items(), options)?;
    Ok(STANDARD.encode(bytes))
}
