//! Cache Pool
//!
//! The pool is the cache-access facade a consumer holds: one storage driver,
//! an optional default item duration and an optional structured logger.
//! [`CachePool`] is the capability the registry resolves and hands out;
//! [`Pool`] is the stock implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::driver::{SharedDriver, StoredEntry};
use crate::error::Result;
use crate::logger::{LogContext, SharedLogger};

// =============================================================================
// Pool Capability
// =============================================================================

/// The capability every registered pool must satisfy.
///
/// The registry never looks past this trait; pool internals belong to the
/// implementation.
pub trait CachePool: Send + Sync {
    /// Bind (or replace) the storage driver
    fn bind_driver(&self, driver: SharedDriver);

    /// Set the default item duration (None = entries never expire)
    fn set_item_duration(&self, duration: Option<Duration>);

    /// Bind a structured logger
    fn set_logger(&self, logger: SharedLogger);

    /// Read a value; expired entries and driver read failures are misses
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Store a value, stamped with the pool's item duration
    fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Delete a value; returns whether one existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Name of the bound driver, if any
    fn driver_name(&self) -> Option<&'static str>;

    /// Whether a logger is bound
    fn has_logger(&self) -> bool;
}

impl std::fmt::Debug for dyn CachePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePool")
            .field("driver", &self.driver_name())
            .finish_non_exhaustive()
    }
}

/// Shared pool handle
pub type SharedPool = Arc<dyn CachePool>;

// =============================================================================
// Stock Pool
// =============================================================================

/// Pool statistics
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Successful reads
    pub hits: u64,
    /// Failed or expired reads
    pub misses: u64,
}

struct PoolInner {
    driver: SharedDriver,
    item_duration: Option<Duration>,
    logger: Option<SharedLogger>,
}

/// The stock cache pool.
pub struct Pool {
    inner: RwLock<PoolInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Pool {
    /// Create a pool bound to a driver.
    pub fn new(driver: SharedDriver) -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                driver,
                item_duration: None,
                logger: None,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Snapshot hit/miss counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Report a driver failure to the bound logger and tracing.
    fn report(&self, message: &str, key: &str, error: &crate::error::Error) {
        warn!(key = %key, error = %error, "{message}");

        let logger = self.inner.read().logger.clone();
        if let Some(logger) = logger {
            let mut context = LogContext::new();
            context.insert("key".into(), Value::String(key.to_string()));
            context.insert("error".into(), Value::String(error.to_string()));
            logger.log(message, &context);
        }
    }
}

impl CachePool for Pool {
    fn bind_driver(&self, driver: SharedDriver) {
        self.inner.write().driver = driver;
    }

    fn set_item_duration(&self, duration: Option<Duration>) {
        self.inner.write().item_duration = duration;
    }

    fn set_logger(&self, logger: SharedLogger) {
        self.inner.write().logger = Some(logger);
    }

    fn get(&self, key: &str) -> Option<Bytes> {
        let driver = self.inner.read().driver.clone();

        match driver.get(key) {
            Ok(Some(entry)) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data)
            }
            Ok(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                // Reads degrade to a miss
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.report("cache read failed", key, &e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let (driver, item_duration) = {
            let inner = self.inner.read();
            (inner.driver.clone(), inner.item_duration)
        };

        // An absurdly large duration saturates to "never expires"
        let expires_at = item_duration.and_then(|d| {
            chrono::Duration::from_std(d)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
        });

        if let Err(e) = driver.put(key, StoredEntry::new(value, expires_at)) {
            // Writes propagate after being reported
            self.report("cache write failed", key, &e);
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let driver = self.inner.read().driver.clone();
        driver.delete(key)
    }

    fn driver_name(&self) -> Option<&'static str> {
        Some(self.inner.read().driver.name())
    }

    fn has_logger(&self) -> bool {
        self.inner.read().logger.is_some()
    }
}
