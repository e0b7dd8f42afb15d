//! Background Expiry Sweeper
//!
//! Lazy expiry keeps reads correct, but an expired key that is never read
//! again would stay in memory. This task reclaims those entries.
//!
//! The sweeper only frees memory. Reads never depend on it having run.
//!
//! ## Adaptive Frequency
//!
//! The interval halves while a large share of keys is expiring and doubles
//! while nothing expires, bounded by `min_interval` and `max_interval`.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval before the first sweep (default: 100ms)
    pub base_interval: Duration,

    /// Lower bound for the interval (default: 10ms)
    pub min_interval: Duration,

    /// Upper bound for the interval (default: 1s)
    pub max_interval: Duration,

    /// Sweep faster when more than this fraction of keys expired
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

impl ExpiryConfig {
    /// Picks the next interval from the outcome of one sweep.
    pub fn next_interval(&self, current: Duration, expired: usize, scanned: usize) -> Duration {
        if scanned == 0 {
            return current;
        }

        let rate = expired as f64 / scanned as f64;
        if rate > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else if expired == 0 {
            (current * 2).min(self.max_interval)
        } else {
            current
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use redkv::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    /// drop(sweeper); // stops the task
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));
        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper. Idempotent.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let scanned = engine.len();
        let expired = engine.cleanup_expired();
        let next = config.next_interval(interval, expired, scanned);

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = scanned.saturating_sub(expired),
                next_interval_ms = next.as_millis(),
                "Expired keys cleaned up"
            );
        } else if next != interval {
            trace!(
                next_interval_ms = next.as_millis(),
                "Nothing expired, backing off"
            );
        }

        interval = next;
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_next_interval() {
        let config = ExpiryConfig::default();
        let base = config.base_interval;

        assert_eq!(config.next_interval(base, 0, 0), base);
        assert_eq!(config.next_interval(base, 50, 100), base / 2);
        assert_eq!(config.next_interval(base, 0, 100), base * 2);
        assert_eq!(config.next_interval(base, 10, 100), base);

        assert_eq!(
            config.next_interval(config.min_interval, 100, 100),
            config.min_interval
        );
        assert_eq!(
            config.next_interval(config.max_interval, 0, 100),
            config.max_interval
        );
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            engine.set_with_ttl(
                Bytes::from(format!("key{}", i)),
                Bytes::from("value"),
                Duration::from_millis(50),
            );
        }
        engine.set(Bytes::from("persistent"), Bytes::from("value"));
        assert_eq!(engine.len(), 11);

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(engine.len(), 1);
        assert!(engine.get(b"persistent").is_some());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nothing swept it, but the read still treats it as gone.
        assert_eq!(engine.len(), 1);
        assert!(engine.get(b"key").is_none());
        assert_eq!(engine.len(), 0);
    }
}
