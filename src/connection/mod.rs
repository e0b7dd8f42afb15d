//! Connection Handler Module
//!
//! Manages individual client connections. Every accepted socket is served
//! by its own async task, so a slow client never blocks the others.
//!
//! ```text
//!            accept()   (server module)
//!               │
//!               │ spawn task
//!               ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                    │
//! │                                                      │
//! │  ┌────────────┐   ┌─────────────┐   ┌─────────────┐  │
//! │  │ Read bytes │──>│ Decode RESP │──>│ Execute cmd │  │
//! │  └────────────┘   └─────────────┘   └──────┬──────┘  │
//! │                                            ▼         │
//! │                                     ┌─────────────┐  │
//! │                                     │ Send reply  │  │
//! │                                     └─────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Commands pipelined into one packet are answered in order, and a command
//! split across packets waits in the buffer until it is complete.
//!
//! ## Example
//!
//! ```ignore
//! use redkv::commands::CommandHandler;
//! use redkv::config::ServerConfig;
//! use redkv::connection::{handle_connection, ConnectionStats};
//! use redkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(
//!     Arc::new(StorageEngine::new()),
//!     Arc::new(ServerConfig::default()),
//! );
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, stats));
//! ```

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, MAX_BUFFER_SIZE,
};
