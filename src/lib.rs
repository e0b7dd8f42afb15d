//! # RedKV - A Small RESP Key-Value Server
//!
//! RedKV speaks the Redis serialization protocol (RESP) over TCP, keeps
//! string keys in a sharded in-memory store with per-key expiry, and can be
//! seeded at startup from an RDB snapshot file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               RedKV                                 │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │── Config     │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │                     ┌─────────────┐    ┌──────────────────────────┐ │
//! │                     │ RESP Parser │    │      StorageEngine       │ │
//! │                     └─────────────┘    │  64 RwLock shards        │ │
//! │                                        └──────────────────────────┘ │
//! │                                           ▲               ▲         │
//! │                     ┌─────────────────────┘               │         │
//! │              ┌──────┴───────┐                  ┌──────────┴──────┐  │
//! │              │   Snapshot   │                  │  ExpirySweeper  │  │
//! │              │   Loader     │                  │  (background)   │  │
//! │              └──────────────┘                  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//! - `CONFIG GET dir|dbfilename`
//! - `KEYS *`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP command decoding and reply encoding
//! - [`storage`]: Thread-safe store with lazy expiry and a background sweeper
//! - [`snapshot`]: RDB snapshot decoding and loading
//! - [`commands`]: Command dispatch
//! - [`connection`]: Per-client read/execute/reply loop
//! - [`server`]: Listener setup and the accept loop
//! - [`config`]: Command-line configuration
//!
//! ## Expiry
//!
//! A key past its expiry is never returned: reads check the deadline and
//! remove the entry on the spot. The background sweeper only reclaims memory
//! for expired keys nobody reads again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod storage;

pub use commands::CommandHandler;
pub use config::{CliAction, ServerConfig};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, ParseError, RespParser, RespValue};
pub use server::{accept_loop, bind_listener};
pub use snapshot::{load_snapshot, LoadOutcome, LoadReport};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port RedKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host RedKV binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of RedKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
