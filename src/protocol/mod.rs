//! Wire Protocol
//!
//! Requests arrive as line-framed arrays of strings and replies go out in
//! RESP encoding.
//!
//! ## Modules
//!
//! - `decoder`: incremental frame decoder producing [`Command`]s
//! - `command`: the decoded command type
//! - `types`: the [`Reply`] enum and its encoder
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{FrameDecoder, Reply};
//!
//! // Decoding a request
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (command, consumed) = FrameDecoder::new().decode(data).unwrap().unwrap();
//! assert_eq!(command.name(), "GET");
//! assert_eq!(consumed, data.len());
//!
//! // Encoding a reply
//! assert_eq!(Reply::bulk("Ariz").encode(), b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod decoder;
pub mod types;

pub use command::Command;
pub use decoder::{decode_frame, DecodeResult, FrameDecoder, FramingError};
pub use types::Reply;
