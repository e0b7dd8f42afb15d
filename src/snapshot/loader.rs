//! Startup loader that seeds the store from a snapshot file.
//!
//! ## Record Stream
//!
//! ```text
//! REDIS0011                         magic + version
//! 0xFA <string> <string>            auxiliary field (ignored)
//! 0xFE <size>                       database selector (ignored)
//! 0xFB <size> <size>                table size hints (ignored)
//! 0xFC <u64 LE ms>  0x00 <key> <value>
//! 0xFD <u32 LE sec> 0x00 <key> <value>
//! 0x00 <key> <value>                string pair without expiry
//! 0xFF                              end of data (checksum after it is ignored)
//! ```
//!
//! Loading is best effort: records applied before a decoding error stay in
//! the store and the server starts anyway.

use crate::snapshot::decoder::{SnapshotDecoder, SnapshotError, SnapshotResult};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Record opcodes.
pub mod opcode {
    pub const AUX: u8 = 0xFA;
    pub const RESIZE_DB: u8 = 0xFB;
    pub const EXPIRE_TIME_MS: u8 = 0xFC;
    pub const EXPIRE_TIME: u8 = 0xFD;
    pub const SELECT_DB: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;
}

/// Value type byte for plain strings, the only type supported.
pub const STRING_TYPE: u8 = 0x00;

/// Counts of what a load did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries installed in the store
    pub loaded: usize,
    /// Entries dropped because their expiry had already passed
    pub skipped_expired: usize,
}

/// Result of a snapshot load.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The whole file was read up to its end marker.
    Loaded(LoadReport),
    /// The file could not be opened; the store starts empty.
    NotFound,
    /// Decoding stopped early. Entries in `report` were kept.
    Corrupt {
        report: LoadReport,
        error: SnapshotError,
    },
}

impl LoadOutcome {
    /// The load counts, if anything was read.
    pub fn report(&self) -> Option<&LoadReport> {
        match self {
            LoadOutcome::Loaded(report) | LoadOutcome::Corrupt { report, .. } => Some(report),
            LoadOutcome::NotFound => None,
        }
    }
}

/// A pairing of monotonic and wall-clock time taken at the same moment,
/// used to translate stored epoch timestamps into store instants.
#[derive(Debug, Clone, Copy)]
pub struct ClockAnchor {
    monotonic: Instant,
    epoch_ms: u64,
}

impl ClockAnchor {
    pub fn now() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            monotonic: Instant::now(),
            epoch_ms,
        }
    }

    pub fn new(monotonic: Instant, epoch_ms: u64) -> Self {
        Self {
            monotonic,
            epoch_ms,
        }
    }

    /// Maps an epoch-millisecond deadline onto the monotonic clock.
    ///
    /// Returns `None` when the deadline is at or before the anchor.
    pub fn expiry_instant(&self, deadline_ms: u64) -> Option<Instant> {
        let remaining = deadline_ms.checked_sub(self.epoch_ms)?;
        if remaining == 0 {
            return None;
        }
        let ttl = Duration::from_millis(remaining);
        self.monotonic.checked_add(ttl)
    }
}

/// Loads `dir/filename` into `engine`.
///
/// A file that cannot be opened is not an error: the store simply starts
/// empty.
pub fn load_snapshot(dir: impl AsRef<Path>, filename: &str, engine: &StorageEngine) -> LoadOutcome {
    let path = dir.as_ref().join(filename);

    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No snapshot to load");
            return LoadOutcome::NotFound;
        }
    };

    let mut data = Vec::new();
    if let Err(e) = file.read_to_end(&mut data) {
        return LoadOutcome::Corrupt {
            report: LoadReport::default(),
            error: e.into(),
        };
    }

    debug!(path = %path.display(), bytes = data.len(), "Read snapshot file");
    load_snapshot_bytes(&data, engine, ClockAnchor::now())
}

/// Loads an in-memory snapshot into `engine`.
pub fn load_snapshot_bytes(data: &[u8], engine: &StorageEngine, clock: ClockAnchor) -> LoadOutcome {
    let mut loader = Loader {
        decoder: SnapshotDecoder::new(data),
        engine,
        clock,
        report: LoadReport::default(),
    };

    match loader.run() {
        Ok(()) => LoadOutcome::Loaded(loader.report),
        Err(error) => LoadOutcome::Corrupt {
            report: loader.report,
            error,
        },
    }
}

struct Loader<'a> {
    decoder: SnapshotDecoder<'a>,
    engine: &'a StorageEngine,
    clock: ClockAnchor,
    report: LoadReport,
}

impl Loader<'_> {
    fn run(&mut self) -> SnapshotResult<()> {
        let version = self.decoder.read_header()?;
        debug!(version = version, "Snapshot header accepted");

        loop {
            let offset = self.decoder.position();
            let op = match self.decoder.read_u8() {
                Ok(op) => op,
                Err(SnapshotError::UnexpectedEof { .. }) => return Err(SnapshotError::MissingEof),
                Err(e) => return Err(e),
            };

            match op {
                opcode::AUX => {
                    let key = self.decoder.read_string()?;
                    let value = self.decoder.read_string()?;
                    trace!(
                        key = %String::from_utf8_lossy(&key),
                        value = %String::from_utf8_lossy(&value),
                        "Skipping auxiliary field"
                    );
                }
                opcode::SELECT_DB => {
                    let db = self.decoder.read_size()?;
                    trace!(db = db, "Skipping database selector");
                }
                opcode::RESIZE_DB => {
                    let keys = self.decoder.read_size()?;
                    let expires = self.decoder.read_size()?;
                    trace!(keys = keys, expires = expires, "Skipping resize hint");
                }
                opcode::EXPIRE_TIME_MS => {
                    let deadline_ms = self.decoder.read_u64_le()?;
                    self.read_expiring_entry(deadline_ms)?;
                }
                opcode::EXPIRE_TIME => {
                    let deadline_ms = u64::from(self.decoder.read_u32_le()?) * 1000;
                    self.read_expiring_entry(deadline_ms)?;
                }
                STRING_TYPE => self.read_entry(None)?,
                opcode::EOF => return Ok(()),
                other => {
                    return Err(SnapshotError::UnknownOpcode {
                        opcode: other,
                        offset,
                    })
                }
            }
        }
    }

    fn read_expiring_entry(&mut self, deadline_ms: u64) -> SnapshotResult<()> {
        let offset = self.decoder.position();
        let value_type = self.decoder.read_u8()?;
        if value_type != STRING_TYPE {
            return Err(SnapshotError::UnsupportedValueType { value_type, offset });
        }
        self.read_entry(Some(deadline_ms))
    }

    fn read_entry(&mut self, deadline_ms: Option<u64>) -> SnapshotResult<()> {
        let key = self.decoder.read_string()?;
        let value = self.decoder.read_string()?;

        match deadline_ms {
            None => self.install(key, value, None),
            Some(ms) => match self.clock.expiry_instant(ms) {
                Some(at) => self.install(key, value, Some(at)),
                None => {
                    trace!(key = %String::from_utf8_lossy(&key), "Skipping expired entry");
                    self.report.skipped_expired += 1;
                }
            },
        }
        Ok(())
    }

    fn install(&mut self, key: Bytes, value: Bytes, expires_at: Option<Instant>) {
        self.engine.load(key, value, expires_at);
        self.report.loaded += 1;
    }
}
