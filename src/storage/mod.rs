//! Storage Engine Module
//!
//! The shared key-value store and its background expiry sweeper.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! Expired entries are invisible to every read whether or not the sweeper
//! has reached them yet.

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
