//! Storage Drivers
//!
//! A driver is the storage backend a pool is bound to. Three drivers ship
//! with the registry:
//!
//! - [`BlackHoleDriver`] - accepts everything, retains nothing
//! - [`MemoryDriver`] - concurrent in-process map
//! - [`FileSystemDriver`] - file-per-key persistent store
//!
//! [`resolve_driver`] maps the host's configured cache mechanism onto a
//! driver configuration; unsupported mechanisms degrade to the black hole
//! with a warning, never to an error.

pub mod blackhole;
pub mod filesystem;
pub mod memory;

pub use blackhole::BlackHoleDriver;
pub use filesystem::{FileSystemConfig, FileSystemDriver};
pub use memory::{MemoryDriver, MemoryDriverStats};

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{CacheMechanism, HostConfig};
use crate::error::Result;

// =============================================================================
// Stored Entry
// =============================================================================

/// A value as it lives inside a driver: payload plus lifecycle timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// The cached payload
    pub data: Bytes,
    /// When the entry was stored
    pub created_at: DateTime<Utc>,
    /// When the entry expires (None = never)
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    /// Create an entry stamped with the current time.
    pub fn new(data: Bytes, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            data,
            created_at: Utc::now(),
            expires_at,
        }
    }

    /// Whether the entry has passed its expiry time.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

// =============================================================================
// Driver Trait
// =============================================================================

/// Storage backend capability.
///
/// All operations are synchronous; the registry core has no suspension
/// points. Implementations must be safe to share across threads.
pub trait Driver: Send + Sync {
    /// Stable driver name, used in logs and tests
    fn name(&self) -> &'static str;

    /// Read an entry
    fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Store an entry, replacing any existing one
    fn put(&self, key: &str, entry: StoredEntry) -> Result<()>;

    /// Delete an entry; returns whether one existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry
    fn clear(&self) -> Result<()>;

    /// Drop expired entries; returns how many were removed
    fn purge(&self) -> Result<u64> {
        Ok(0)
    }
}

/// Shared driver handle
pub type SharedDriver = Arc<dyn Driver>;

// =============================================================================
// Driver Configuration
// =============================================================================

/// Declarative driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum DriverConfig {
    /// File-per-key store rooted at `path`
    FileSystem { path: PathBuf },
    /// In-process concurrent map
    Memory,
    /// Accepts writes, retains nothing
    BlackHole,
}

impl DriverConfig {
    /// Build the configured driver.
    ///
    /// Filesystem construction can fail (unusable root directory); that is
    /// a configuration defect and propagates.
    pub fn build(&self) -> Result<SharedDriver> {
        Ok(match self {
            DriverConfig::FileSystem { path } => Arc::new(FileSystemDriver::new(path)?),
            DriverConfig::Memory => Arc::new(MemoryDriver::new()),
            DriverConfig::BlackHole => Arc::new(BlackHoleDriver),
        })
    }
}

/// Where the registry's default-pool driver comes from: an already-built
/// instance, or a declarative config built once and cached.
#[derive(Clone)]
pub enum DriverSource {
    /// Use this driver as-is
    Instance(SharedDriver),
    /// Build from config on first use, then reuse
    Config(DriverConfig),
}

impl std::fmt::Debug for DriverSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverSource::Instance(driver) => {
                f.debug_tuple("Instance").field(&driver.name()).finish()
            }
            DriverSource::Config(config) => f.debug_tuple("Config").field(config).finish(),
        }
    }
}

// =============================================================================
// Driver Resolution
// =============================================================================

/// Map the host's cache mechanism onto a driver configuration.
///
/// Filesystem-backed mechanisms map to the filesystem driver with the
/// alias-resolved storage path. Every other mechanism logs a warning and
/// degrades to the black-hole driver. Never fails.
pub fn resolve_driver(config: &HostConfig) -> DriverConfig {
    match &config.mechanism {
        CacheMechanism::FileCache { cache_path } => DriverConfig::FileSystem {
            path: config.resolve_alias(cache_path),
        },
        other => {
            warn!(
                mechanism = %other.name(),
                "unsupported cache mechanism, falling back to the black-hole driver"
            );
            DriverConfig::BlackHole
        }
    }
}
