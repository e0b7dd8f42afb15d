//! Snapshot Loading
//!
//! Reads an RDB-style binary dump at startup and installs its string entries,
//! with their absolute expiry times, into the [`StorageEngine`].
//!
//! ## Modules
//!
//! - `decoder`: Size, string and integer primitives plus [`SnapshotError`]
//! - `loader`: The opcode stream walker and [`load_snapshot`]
//!
//! Only loading is supported; the server never writes snapshots.
//!
//! [`StorageEngine`]: crate::storage::StorageEngine

pub mod decoder;
pub mod loader;

pub use decoder::{SnapshotDecoder, SnapshotError, SnapshotResult};
pub use loader::{load_snapshot, load_snapshot_bytes, ClockAnchor, LoadOutcome, LoadReport};
