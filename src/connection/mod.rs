//! Client Connections
//!
//! Each accepted stream is driven by its own [`Session`] on its own tokio
//! task, so sessions run independently of each other.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Session                                │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Decode frame│───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │         ▲                                     │             │
//! │         │                                     ▼             │
//! │         │                              ┌─────────────┐      │
//! │         └──────────────────────────────│ Write reply │      │
//! │                                        └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod session;

pub use session::{
    handle_connection, Session, SessionError, SessionSettings, SessionStats, StatsSnapshot,
    DEFAULT_MAX_BUFFER,
};
