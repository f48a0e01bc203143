//! poolstash - Pluggable Cache-Pool Registry
//!
//! Resolves a logical cache handle (`default`, `dummy`, or
//! extension-provided) to a ready-to-use cache pool, while letting any
//! number of providers register additional named pools: as built instances,
//! as deferred factories, or as declarative configs naming a registered
//! pool kind plus constructor arguments.
//!
//! # Architecture
//!
//! ```text
//! CacheRegistry::find_all
//!     ├─ seed { default: application pool, dummy: no-op pool }
//!     ├─ fold PoolProviders over the descriptor set, in order
//!     ├─ KindRegistry::resolve each descriptor
//!     └─ PoolMap (failing handles dropped, construction defects abort)
//! ```
//!
//! The application pool's driver comes from the host's configured cache
//! mechanism; unsupported mechanisms degrade to the black-hole driver with
//! a warning. `get(handle)` never returns nothing: a missing handle logs an
//! error and yields a fresh no-op pool.
//!
//! # Example
//!
//! ```
//! use poolstash::{CacheMechanism, CachePool, CacheRegistry, HostConfig, PoolSet};
//! use serde_json::json;
//!
//! // A mechanism with no driver mapping degrades to the black hole
//! let config = HostConfig::default().with_mechanism(CacheMechanism::Custom {
//!     name: "example".into(),
//! });
//! let mut registry = CacheRegistry::new(config);
//! registry.register_provider(|mut pools: PoolSet| {
//!     pools.add("scratch", json!({ "class": "pool", "driver": { "backend": "memory" } }));
//!     pools
//! });
//!
//! let pool = registry.get("scratch")?;
//! pool.set("answer", bytes::Bytes::from("42"))?;
//! assert_eq!(pool.get("answer"), Some(bytes::Bytes::from("42")));
//! # Ok::<(), poolstash::Error>(())
//! ```
//!
//! # Modules
//!
//! - [`config`] - Host configuration (mechanism, duration, path aliases)
//! - [`compression`] - LZ4 entry compression for the filesystem driver
//! - [`descriptor`] - Pool descriptors and the kind-based resolver
//! - [`driver`] - Storage drivers (black hole, memory, filesystem)
//! - [`error`] - Error types
//! - [`logger`] - Structured pool logging capability
//! - [`pool`] - The cache pool facade
//! - [`registry`] - The registry orchestrator and provider hook

pub mod compression;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod logger;
pub mod pool;
pub mod registry;

// Re-export commonly used types
pub use config::{CacheMechanism, HostConfig};
pub use descriptor::{KindRegistry, PoolDescriptor, ResolveError};
pub use driver::{
    resolve_driver, BlackHoleDriver, Driver, DriverConfig, DriverSource, FileSystemDriver,
    MemoryDriver, SharedDriver, StoredEntry,
};
pub use error::{Error, Result};
pub use logger::{LogContext, MemoryLogger, PoolLogger, SharedLogger, TracingLogger};
pub use pool::{CachePool, Pool, SharedPool};
pub use registry::{
    CacheRegistry, PoolMap, PoolProvider, PoolSet, DEFAULT_HANDLE, DUMMY_HANDLE,
};
