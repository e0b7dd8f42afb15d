//! Server configuration and command-line parsing.
//!
//! Configuration is built once at startup and is read-only afterwards, so it
//! is shared between connections behind a plain `Arc`.

use std::net::SocketAddr;
use thiserror::Error;

/// Default directory holding the snapshot file.
pub const DEFAULT_DIR: &str = ".";

/// Default snapshot file name.
pub const DEFAULT_DBFILENAME: &str = "dump.rdb";

/// Errors from command-line parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// What the process should do after parsing its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(ServerConfig),
    Help,
    Version,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Directory containing the snapshot file
    pub dir: String,
    /// Snapshot file name inside `dir`
    pub dbfilename: String,
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_DIR.to_string(),
            dbfilename: DEFAULT_DBFILENAME.to_string(),
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Parses command-line arguments, excluding the program name.
    pub fn parse_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = ServerConfig::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let missing = || ConfigError::MissingValue(arg.clone());

            match arg.as_str() {
                "--dir" => config.dir = args.next().ok_or_else(missing)?,
                "--dbfilename" => config.dbfilename = args.next().ok_or_else(missing)?,
                "--host" | "-h" => config.host = args.next().ok_or_else(missing)?,
                "--port" | "-p" => {
                    let raw = args.next().ok_or_else(missing)?;
                    config.port = raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?;
                }
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg.clone())),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Looks up a parameter by name for `CONFIG GET`.
    ///
    /// Returns the canonical parameter name with its value. Only `dir` and
    /// `dbfilename` are exposed.
    pub fn get(&self, name: &str) -> Option<(&'static str, &str)> {
        if name.eq_ignore_ascii_case("dir") {
            Some(("dir", &self.dir))
        } else if name.eq_ignore_ascii_case("dbfilename") {
            Some(("dbfilename", &self.dbfilename))
        } else {
            None
        }
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses the bind address.
    pub fn socket_addr(&self) -> std::io::Result<SocketAddr> {
        self.bind_address().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid bind address {}: {}", self.bind_address(), e),
            )
        })
    }
}
