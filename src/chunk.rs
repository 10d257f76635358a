//! Turning raw poll results into data chunks.

use std::borrow::Cow;

/// Decode the bytes read in one poll into the text handed to data subscribers.
///
/// Carriage returns and line feeds are removed when `strip_terminators` is
/// set. Bytes that are not valid UTF-8 are replaced, never dropped silently.
/// Returns `None` when nothing is left to deliver.
///
/// ```
/// use serial_port_reader::chunk::decode_chunk;
///
/// assert_eq!(decode_chunk(b"23.5\r\n", true).as_deref(), Some("23.5"));
/// assert_eq!(decode_chunk(b"23.5\r\n", false).as_deref(), Some("23.5\r\n"));
/// assert_eq!(decode_chunk(b"\r\n", true), None);
/// ```
pub fn decode_chunk(raw: &[u8], strip_terminators: bool) -> Option<String> {
    let bytes = if strip_terminators {
        strip_line_terminators(raw)
    } else {
        Cow::Borrowed(raw)
    };

    if bytes.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Remove every `\r` and `\n` byte.
///
/// Both are ASCII, so they never occur inside a multi-byte UTF-8 sequence and
/// can be dropped before decoding.
fn strip_line_terminators(raw: &[u8]) -> Cow<'_, [u8]> {
    let mut terminators = memchr::memchr2_iter(b'\r', b'\n', raw).peekable();
    if terminators.peek().is_none() {
        return Cow::Borrowed(raw);
    }

    let mut kept = Vec::with_capacity(raw.len());
    let mut start = 0;
    for pos in terminators {
        kept.extend_from_slice(&raw[start..pos]);
        start = pos + 1;
    }
    kept.extend_from_slice(&raw[start..]);
    Cow::Owned(kept)
}
