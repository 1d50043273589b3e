//! Incremental Frame Decoder
//!
//! Turns buffered client bytes into [`Command`]s. A frame looks like:
//!
//! ```text
//! *<N>\n
//! <length line>\n
//! <element 1>\n
//! <length line>\n
//! <element 2>\n
//! ...
//! ```
//!
//! Lines end at `\n`; a preceding `\r` is treated as trailing whitespace.
//! The first element names the command, the rest are its arguments.
//!
//! ## How the Decoder Works
//!
//! `decode()` looks at the start of a buffer and returns either:
//! - `Ok(Some((command, consumed)))` - a whole frame was available
//! - `Ok(None)` - the frame is not complete yet, read more and retry
//! - `Err(FramingError)` - the bytes cannot be a frame
//!
//! The caller advances its buffer by `consumed` bytes on success.
//!
//! ## Length Lines
//!
//! By default the length line preceding each element is read and discarded
//! and the element is its payload line with trailing whitespace removed.
//! With strict lengths enabled the length line must read `$<n>`, only the
//! line terminator is removed from the payload, and the payload must be
//! exactly `n` bytes.

use crate::protocol::command::Command;
use crate::protocol::types::prefix;
use bytes::Bytes;
use thiserror::Error;

/// Upper bound on elements pre-allocated from an untrusted count.
const MAX_PREALLOC: usize = 64;

/// Errors that make a byte stream undecodable.
///
/// None of these are recoverable for the session that produced them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The frame did not start with `*`
    #[error("unexpected format: {0:?}")]
    UnexpectedFormat(String),

    /// The element count after `*` is not a non-negative integer
    #[error("invalid element count: {0:?}")]
    InvalidCount(String),

    /// A frame with no elements carries no command name
    #[error("empty frame")]
    EmptyFrame,

    /// Strict mode: a length line is not `$<n>`
    #[error("invalid length line: {0:?}")]
    InvalidLength(String),

    /// Strict mode: the payload is not as long as its length line says
    #[error("length mismatch: declared {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The stream ended in the middle of a frame
    #[error("stream closed")]
    StreamClosed,
}

impl FramingError {
    /// Whether the client should be told about the error before the
    /// session closes. A stream that already ended is closed silently.
    pub fn wants_reply(&self) -> bool {
        !matches!(self, FramingError::StreamClosed)
    }
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, FramingError>;

/// Decoder for line-framed commands.
///
/// # Example
///
/// ```
/// use emberkv::protocol::FrameDecoder;
///
/// let decoder = FrameDecoder::new();
/// let input = b"*2\n$4\nECHO\n$2\nhi\n";
/// let (command, consumed) = decoder.decode(input).unwrap().unwrap();
/// assert_eq!(command.name(), "ECHO");
/// assert_eq!(consumed, input.len());
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameDecoder {
    strict_lengths: bool,
}

impl FrameDecoder {
    /// Creates a decoder that ignores length lines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that validates length lines against payloads.
    pub fn strict() -> Self {
        Self {
            strict_lengths: true,
        }
    }

    /// Attempts to decode one frame from the start of `buf`.
    pub fn decode(&self, buf: &[u8]) -> DecodeResult<Option<(Command, usize)>> {
        let mut pos = 0;

        let header = match next_line(buf, &mut pos) {
            Some(line) => line,
            None => return Ok(None),
        };

        if header.first() != Some(&prefix::ARRAY) {
            return Err(FramingError::UnexpectedFormat(lossy(header)));
        }

        let count = parse_decimal(header[1..].trim_ascii())
            .ok_or_else(|| FramingError::InvalidCount(lossy(&header[1..])))?;

        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            let length_line = match next_line(buf, &mut pos) {
                Some(line) => line,
                None => return Ok(None),
            };
            let payload = match next_line(buf, &mut pos) {
                Some(line) => line,
                None => return Ok(None),
            };
            elements.push(self.element(length_line, payload)?);
        }

        match Command::from_elements(elements) {
            Some(command) => Ok(Some((command, pos))),
            None => Err(FramingError::EmptyFrame),
        }
    }

    /// Extracts one element's value from its length and payload lines.
    fn element(&self, length_line: &[u8], payload: &[u8]) -> DecodeResult<Bytes> {
        if !self.strict_lengths {
            return Ok(Bytes::copy_from_slice(payload.trim_ascii_end()));
        }

        let declared = match length_line.trim_ascii_end().split_first() {
            Some((&prefix::BULK_STRING, digits)) => parse_decimal(digits),
            _ => None,
        }
        .ok_or_else(|| FramingError::InvalidLength(lossy(length_line)))?;

        let payload = payload.strip_suffix(b"\r").unwrap_or(payload);
        if payload.len() != declared {
            return Err(FramingError::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }

        Ok(Bytes::copy_from_slice(payload))
    }
}

/// Returns the next `\n`-terminated line starting at `pos`, without the
/// `\n`, and moves `pos` past it. Returns `None` if no full line is buffered.
#[inline]
fn next_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let rest = buf.get(*pos..)?;
    let end = rest.iter().position(|&b| b == b'\n')?;
    *pos += end + 1;
    Some(&rest[..end])
}

/// Parses an unsigned decimal with no sign and at least one digit.
fn parse_decimal(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// Decodes a single frame with the default lenient decoder.
pub fn decode_frame(buf: &[u8]) -> DecodeResult<Option<(Command, usize)>> {
    FrameDecoder::new().decode(buf)
}
