//! Command Dispatch
//!
//! Receives decoded commands, executes them against the session's store
//! and returns the reply.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  FrameDecoder   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  StoreHandle    │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::{CommandError, CommandHandler, CommandKind};
