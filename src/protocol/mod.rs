//! RESP Protocol Implementation
//!
//! Clients send commands as RESP arrays of bulk strings and receive typed
//! replies back.
//!
//! ## Modules
//!
//! - `command`: The decoded [`Command`] argument list
//! - `parser`: All-or-nothing decoder for incoming requests
//! - `types`: The [`RespValue`] reply model and its encoder
//!
//! ## Example
//!
//! ```
//! use redkv::protocol::{parse_command, RespValue};
//!
//! let data = b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n";
//! let (command, consumed) = parse_command(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//! assert_eq!(command.len(), 2);
//!
//! let reply = RespValue::bulk_string(command.arg(1).unwrap().clone());
//! assert_eq!(reply.serialize(), b"$3\r\nhey\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::Command;
pub use parser::{parse_command, resync_offset, ParseError, ParseResult, RespParser};
pub use types::RespValue;
