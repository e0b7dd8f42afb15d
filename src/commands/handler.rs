//! Command Dispatcher
//!
//! Maps a decoded [`Command`] to a store operation or a static reply.
//!
//! ## Supported Commands
//!
//! - `PING` - replies `PONG`
//! - `ECHO message` - replies with `message`
//! - `SET key value [PX milliseconds]` - stores a value, optionally expiring
//! - `GET key` - fetches a value or the null bulk string
//! - `CONFIG GET parameter` - `dir` or `dbfilename`
//! - `KEYS *` - lists live keys
//!
//! Verbs are matched case-sensitively as uppercase tokens. The `PX` option
//! is accepted as `PX` or `px`. A recognized verb with the wrong number of
//! arguments gets an arity error rather than the unknown-command error.

use crate::config::ServerConfig;
use crate::protocol::{Command, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Executes commands against the shared store and configuration.
///
/// Cheap to clone; each connection gets its own copy.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    config: Arc<ServerConfig>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>, config: Arc<ServerConfig>) -> Self {
        Self { storage, config }
    }

    /// Executes a command and returns the reply to send back.
    pub fn execute(&self, command: &Command) -> RespValue {
        let Some(name) = command.name() else {
            return RespValue::error("ERR empty command");
        };
        let args = &command.args()[1..];

        match name {
            b"PING" => self.cmd_ping(args),
            b"ECHO" => self.cmd_echo(args),
            b"SET" => self.cmd_set(args),
            b"GET" => self.cmd_get(args),
            b"CONFIG" => self.cmd_config(args),
            b"KEYS" => self.cmd_keys(args),
            _ => RespValue::error(format!(
                "ERR unknown command '{}'",
                String::from_utf8_lossy(name)
            )),
        }
    }

    /// PING
    fn cmd_ping(&self, args: &[Bytes]) -> RespValue {
        if !args.is_empty() {
            return wrong_arity("PING");
        }
        RespValue::pong()
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> RespValue {
        match args {
            [message] => RespValue::bulk_string(message.clone()),
            _ => wrong_arity("ECHO"),
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        match args {
            [key, value] => {
                self.storage.set(key.clone(), value.clone());
                RespValue::ok()
            }
            [key, value, option, amount] => {
                if &option[..] != b"PX" && &option[..] != b"px" {
                    return RespValue::error("ERR syntax error");
                }
                let Some(ms) = parse_positive(amount) else {
                    return RespValue::error("ERR invalid expire time in 'SET' command");
                };
                self.storage
                    .set_with_ttl(key.clone(), value.clone(), Duration::from_millis(ms));
                RespValue::ok()
            }
            _ => wrong_arity("SET"),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let [key] = args else {
            return wrong_arity("GET");
        };

        match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// CONFIG GET parameter
    fn cmd_config(&self, args: &[Bytes]) -> RespValue {
        let [subcommand, parameter] = args else {
            return wrong_arity("CONFIG");
        };

        if &subcommand[..] != b"GET" {
            return RespValue::error(format!(
                "ERR unknown subcommand '{}' for 'CONFIG'",
                String::from_utf8_lossy(subcommand)
            ));
        }

        let found = std::str::from_utf8(parameter)
            .ok()
            .and_then(|name| self.config.get(name));

        match found {
            Some((name, value)) => RespValue::bulk_array([
                Bytes::from_static(name.as_bytes()),
                Bytes::copy_from_slice(value.as_bytes()),
            ]),
            None => RespValue::array(vec![]),
        }
    }

    /// KEYS *
    fn cmd_keys(&self, args: &[Bytes]) -> RespValue {
        let [pattern] = args else {
            return wrong_arity("KEYS");
        };

        if &pattern[..] != b"*" {
            return RespValue::error("ERR only '*' pattern is supported");
        }

        RespValue::bulk_array(self.storage.keys("*"))
    }
}

fn wrong_arity(command: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
}

/// Parses a strictly positive decimal integer.
fn parse_positive(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&n| n > 0)
}
