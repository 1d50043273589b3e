//! Reply Types
//!
//! This module defines the replies the server sends back to clients and
//! their wire encoding.
//!
//! ## Wire Format
//!
//! Each reply starts with a type prefix byte and ends with CRLF:
//! - `+` Simple status: `+OK\r\n`
//! - `-` Error: `-ERR unknown command 'FOO'\r\n`
//! - `$` Bulk string: `$5\r\nhello\r\n`
//! - `$-1` Null bulk string: `$-1\r\n`
//!
//! Error messages are stored without the `ERR ` tag; the encoder adds it.

use bytes::Bytes;

/// The CRLF terminator used in replies
pub const CRLF: &[u8] = b"\r\n";

/// Tag written between the `-` prefix and the error message
pub const ERROR_TAG: &[u8] = b"ERR ";

/// Protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply produced by the command dispatcher.
///
/// Encoding is total: every value of this type has a wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Single-line status.
    /// Format: `+<status>\r\n`
    Status(String),

    /// Single-line error. The message excludes the `ERR ` tag.
    /// Format: `-ERR <message>\r\n`
    Error(String),

    /// Length-prefixed string.
    /// Format: `$<length>\r\n<data>\r\n`
    Bulk(Bytes),

    /// Null bulk string, meaning "no value".
    /// Format: `$-1\r\n`
    Null,
}

impl Reply {
    /// Creates a status reply.
    ///
    /// # Example
    /// ```
    /// use emberkv::protocol::Reply;
    /// assert_eq!(Reply::status("OK").encode(), b"+OK\r\n");
    /// ```
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use emberkv::protocol::Reply;
    /// assert_eq!(Reply::error("syntax error").encode(), b"-ERR syntax error\r\n");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Creates a bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Creates a null bulk reply.
    pub fn null() -> Self {
        Reply::Null
    }

    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// Reply sent before a session is closed for a malformed frame.
    pub fn protocol_error() -> Self {
        Reply::Error("Protocol error".to_string())
    }

    /// Encodes the reply into its wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes the reply into an existing buffer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(ERROR_TAG);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
        }
    }

    /// Number of bytes `encode` will produce.
    pub fn encoded_len(&self) -> usize {
        match self {
            Reply::Status(s) => 1 + s.len() + 2,
            Reply::Error(s) => 1 + ERROR_TAG.len() + s.len() + 2,
            Reply::Bulk(data) => 1 + decimal_width(data.len()) + 2 + data.len() + 2,
            Reply::Null => 5,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

fn decimal_width(mut n: usize) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}
