//! # emberkv - A Small In-Memory Key-Value Server
//!
//! emberkv accepts stream connections, reads line-framed commands, and
//! answers in RESP. It stores string values with optional millisecond
//! expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              emberkv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│   Session   │───>│  Command    │                  │
//! │  │ (Listener)  │    │ (per conn)  │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────┐                  │
//! │                     │   Frame     │    │ KeyValue    │                  │
//! │                     │   Decoder   │    │ Store       │                  │
//! │                     └─────────────┘    └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use emberkv::{serve, Config};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     serve(&Config::default()).await
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//!
//! ## Store Scope
//!
//! Every connection gets a fresh, private key space unless the server is
//! started with `--shared-store`. Expired keys are dropped lazily, when a
//! `GET` finds them.
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame decoder, command and reply types
//! - [`commands`]: command dispatch
//! - [`storage`]: the key-value store and its ownership scopes
//! - [`connection`]: the per-connection session loop
//! - [`server`]: the TCP accept loop
//! - [`config`]: command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, ConfigAction, ConfigError};
pub use connection::{handle_connection, Session, SessionSettings, SessionStats, StatsSnapshot};
pub use protocol::{Command, FrameDecoder, FramingError, Reply};
pub use server::{serve, Server};
pub use storage::{KeyValueStore, StoreFactory, StoreScope};

/// The default port emberkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host emberkv binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
