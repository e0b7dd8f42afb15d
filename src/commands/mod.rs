//! Command Handler Module
//!
//! Receives decoded commands, runs them against the storage engine or the
//! server configuration, and returns the reply to encode.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │──── ServerConfig (CONFIG GET)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO`
//! - `SET` (with optional `PX`), `GET`
//! - `CONFIG GET`, `KEYS *`

pub mod handler;

pub use handler::CommandHandler;
