//! Command Handler
//!
//! Maps decoded commands onto the store and produces replies.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `ECHO message` - Echo message
//! - `SET key value [PX milliseconds]` - Set a key, optionally with expiry
//! - `GET key` - Get a key's value
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ CommandKind │───>│  dispatch() │───>│   cmd_*()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                          StoreHandle        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers return `Result<Reply, CommandError>`; `execute` turns every
//! error into an error reply, so nothing escapes to the session.

use crate::protocol::{Command, Reply};
use crate::storage::StoreHandle;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// The closed set of commands the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Echo,
    Set,
    Get,
}

impl CommandKind {
    /// Looks up a command by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        const TABLE: [(&str, CommandKind); 4] = [
            ("PING", CommandKind::Ping),
            ("ECHO", CommandKind::Echo),
            ("SET", CommandKind::Set),
            ("GET", CommandKind::Get),
        ];

        TABLE
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|&(_, kind)| kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Ping => "ping",
            CommandKind::Echo => "echo",
            CommandKind::Set => "set",
            CommandKind::Get => "get",
        }
    }
}

/// Per-command failures. Each becomes an error reply and the session
/// carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{}' command", .0.name())]
    WrongArity(CommandKind),

    #[error("syntax error")]
    Syntax,

    #[error("invalid expire time in 'set' command")]
    InvalidExpireTime,
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        Reply::error(err.to_string())
    }
}

type CommandResult = Result<Reply, CommandError>;

/// Executes commands against one session's store.
#[derive(Debug)]
pub struct CommandHandler {
    store: StoreHandle,
}

impl CommandHandler {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Executes a command and returns the reply to send.
    ///
    /// Never fails: unknown commands and bad arguments produce error replies.
    pub fn execute(&mut self, command: &Command) -> Reply {
        let result = match CommandKind::from_name(command.name()) {
            Some(kind) => self.dispatch(kind, command.args()),
            None => Err(CommandError::UnknownCommand(printable(command.name()))),
        };

        result.unwrap_or_else(Reply::from)
    }

    pub fn store_mut(&mut self) -> &mut StoreHandle {
        &mut self.store
    }

    fn dispatch(&mut self, kind: CommandKind, args: &[Bytes]) -> CommandResult {
        match kind {
            CommandKind::Ping => self.cmd_ping(args),
            CommandKind::Echo => self.cmd_echo(args),
            CommandKind::Set => self.cmd_set(args),
            CommandKind::Get => self.cmd_get(args),
        }
    }

    /// PING
    fn cmd_ping(&mut self, args: &[Bytes]) -> CommandResult {
        match args {
            [] => Ok(Reply::pong()),
            _ => Err(CommandError::WrongArity(CommandKind::Ping)),
        }
    }

    /// ECHO message
    fn cmd_echo(&mut self, args: &[Bytes]) -> CommandResult {
        match args {
            [message] => Ok(Reply::bulk(message.clone())),
            _ => Err(CommandError::WrongArity(CommandKind::Echo)),
        }
    }

    /// SET key value [PX milliseconds]
    ///
    /// An option other than `PX` in third position is ignored and the key is
    /// stored without expiry.
    fn cmd_set(&mut self, args: &[Bytes]) -> CommandResult {
        let (key, value, options) = match args {
            [key, value, options @ ..] if options.len() <= 2 => (key, value, options),
            _ => return Err(CommandError::WrongArity(CommandKind::Set)),
        };

        let ttl = match options {
            [option, rest @ ..] if option.eq_ignore_ascii_case(b"PX") => match rest {
                [millis] => Some(parse_millis(millis)?),
                _ => return Err(CommandError::Syntax),
            },
            _ => None,
        };

        self.store.set(key.clone(), value.clone(), ttl);
        Ok(Reply::ok())
    }

    /// GET key
    fn cmd_get(&mut self, args: &[Bytes]) -> CommandResult {
        let key = match args {
            [key] => key,
            _ => return Err(CommandError::WrongArity(CommandKind::Get)),
        };

        Ok(match self.store.get(key) {
            Some(value) => Reply::bulk(value),
            None => Reply::null(),
        })
    }
}

/// Replaces control characters so a client-supplied name cannot break the
/// error reply line.
fn printable(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Parses a non-negative millisecond count.
fn parse_millis(arg: &[u8]) -> Result<Duration, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .ok_or(CommandError::InvalidExpireTime)
}
