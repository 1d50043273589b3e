//! Server configuration parsed from the command line.

use crate::connection::{SessionSettings, DEFAULT_MAX_BUFFER};
use crate::storage::StoreScope;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use thiserror::Error;

/// Errors from command-line parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("invalid value for {flag}: {value:?}")]
    InvalidValue { flag: &'static str, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Whether sessions share one store
    pub store_scope: StoreScope,
    /// Validate element length lines
    pub strict_lengths: bool,
    /// Cap on unparsed bytes per session
    pub max_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            store_scope: StoreScope::PerConnection,
            strict_lengths: false,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigAction {
    Run(Config),
    Help,
    Version,
}

impl Config {
    /// Parses the process arguments.
    pub fn from_args() -> Result<ConfigAction, ConfigError> {
        Self::parse_args(std::env::args().skip(1))
    }

    /// Parses arguments, not including the program name.
    pub fn parse_args<I, T>(args: I) -> Result<ConfigAction, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().ok_or(ConfigError::MissingValue("--host"))?;
                }
                "--port" | "-p" => {
                    config.port = parse_value("--port", args.next())?;
                }
                "--max-buffer" => {
                    config.max_buffer = parse_value("--max-buffer", args.next())?;
                    if config.max_buffer == 0 {
                        return Err(ConfigError::InvalidValue {
                            flag: "--max-buffer",
                            value: "0".to_string(),
                        });
                    }
                }
                "--shared-store" => config.store_scope = StoreScope::Shared,
                "--strict-lengths" => config.strict_lengths = true,
                "--help" => return Ok(ConfigAction::Help),
                "--version" | "-v" => return Ok(ConfigAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(ConfigAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            strict_lengths: self.strict_lengths,
            max_buffer: self.max_buffer,
        }
    }
}

fn parse_value<T: std::str::FromStr>(
    flag: &'static str,
    value: Option<String>,
) -> Result<T, ConfigError> {
    let value = value.ok_or(ConfigError::MissingValue(flag))?;
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { flag, value })
}

pub const HELP: &str = r#"
emberkv - A small in-memory key-value server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>         Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>         Port to listen on (default: 6379)
        --shared-store        Share one key space between all connections
        --strict-lengths      Reject elements whose length line does not match
        --max-buffer <BYTES>  Unparsed bytes allowed per connection (default: 1048576)
    -v, --version             Print version information
        --help                Print this help message

By default every connection gets its own empty key space.

EXAMPLES:
    emberkv                        # Start on 0.0.0.0:6379
    emberkv --port 6380            # Start on port 6380
    emberkv --shared-store         # One key space for all clients
"#;
