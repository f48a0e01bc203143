//! Cache Registry
//!
//! The orchestrator: assembles the built-in pools (`default`, `dummy`),
//! runs every registered [`PoolProvider`] over the descriptor set in order,
//! resolves each descriptor and answers handle lookups with a no-op
//! fallback. `find_all` re-evaluates the whole pipeline on every call; the
//! only cross-call state is the write-once driver-override cache and the
//! host logger probe.

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use tracing::{debug, error};

use crate::config::HostConfig;
use crate::descriptor::{KindRegistry, PoolDescriptor, ResolveError};
use crate::driver::{resolve_driver, BlackHoleDriver, DriverSource, SharedDriver};
use crate::error::Result;
use crate::logger::SharedLogger;
use crate::pool::{CachePool, Pool, SharedPool};

/// Handle of the application pool
pub const DEFAULT_HANDLE: &str = "default";
/// Handle of the always-available no-op pool
pub const DUMMY_HANDLE: &str = "dummy";

/// Resolved pools by handle, in surviving insertion order
pub type PoolMap = IndexMap<String, SharedPool>;

// =============================================================================
// Pool Set
// =============================================================================

/// The mutable handle -> descriptor set providers transform.
///
/// Insertion-ordered; adding an existing handle overwrites it in place.
#[derive(Debug, Clone, Default)]
pub struct PoolSet {
    pools: IndexMap<String, PoolDescriptor>,
}

impl PoolSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a handle.
    pub fn add(&mut self, handle: impl Into<String>, descriptor: impl Into<PoolDescriptor>) {
        self.pools.insert(handle.into(), descriptor.into());
    }

    /// Merge every entry of `other` into this set.
    pub fn add_all<I, H, D>(&mut self, other: I)
    where
        I: IntoIterator<Item = (H, D)>,
        H: Into<String>,
        D: Into<PoolDescriptor>,
    {
        for (handle, descriptor) in other {
            self.add(handle, descriptor);
        }
    }

    /// Remove a handle; returns its descriptor if present.
    pub fn remove(&mut self, handle: &str) -> Option<PoolDescriptor> {
        self.pools.shift_remove(handle)
    }

    /// Whether a handle is present.
    pub fn contains(&self, handle: &str) -> bool {
        self.pools.contains_key(handle)
    }

    /// Handles in insertion order.
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl IntoIterator for PoolSet {
    type Item = (String, PoolDescriptor);
    type IntoIter = indexmap::map::IntoIter<String, PoolDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.pools.into_iter()
    }
}

// =============================================================================
// Pool Provider
// =============================================================================

/// Extension hook: providers transform the descriptor set before
/// resolution, in registration order, with full read/write access. Any
/// handle may be added, overwritten or removed, `default` and `dummy`
/// included.
pub trait PoolProvider: Send + Sync {
    /// Transform the accumulating descriptor set.
    fn provide(&self, pools: PoolSet) -> PoolSet;
}

impl<F> PoolProvider for F
where
    F: Fn(PoolSet) -> PoolSet + Send + Sync,
{
    fn provide(&self, pools: PoolSet) -> PoolSet {
        self(pools)
    }
}

// =============================================================================
// Cache Registry
// =============================================================================

/// The cache-pool registry.
pub struct CacheRegistry {
    config: HostConfig,
    kinds: KindRegistry,
    providers: Vec<Box<dyn PoolProvider>>,
    /// Logger set explicitly by the registry's owner
    logger: Option<SharedLogger>,
    /// Host logger probe memo: unresolved / none / present
    probed_logger: OnceCell<Option<SharedLogger>>,
    /// Driver override for the application pool
    driver_source: Option<DriverSource>,
    /// Declarative override, built at most once
    built_driver: OnceCell<SharedDriver>,
}

impl CacheRegistry {
    /// Create a registry with the built-in pool kinds.
    pub fn new(config: HostConfig) -> Self {
        Self::with_kinds(config, KindRegistry::with_builtins())
    }

    /// Create a registry with a custom kind registry.
    pub fn with_kinds(config: HostConfig, kinds: KindRegistry) -> Self {
        Self {
            config,
            kinds,
            providers: Vec::new(),
            logger: None,
            probed_logger: OnceCell::new(),
            driver_source: None,
            built_driver: OnceCell::new(),
        }
    }

    /// The registry's kind registry.
    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    /// Mutable access to the kind registry, for registering more kinds.
    pub fn kinds_mut(&mut self) -> &mut KindRegistry {
        &mut self.kinds
    }

    /// Set the logger bound to every built pool, overriding the host's.
    pub fn set_logger(&mut self, logger: SharedLogger) {
        self.logger = Some(logger);
    }

    /// Override the application pool's driver.
    ///
    /// An instance is used as-is; a declarative config is built once on
    /// first use and reused until the next `set_driver` call, which
    /// discards any previously built driver.
    pub fn set_driver(&mut self, source: DriverSource) {
        self.driver_source = Some(source);
        self.built_driver = OnceCell::new();
    }

    /// Append a provider; providers run in registration order.
    pub fn register_provider<P>(&mut self, provider: P)
    where
        P: PoolProvider + 'static,
    {
        self.providers.push(Box::new(provider));
    }

    // -------------------------------------------------------------------------
    // Logger binding
    // -------------------------------------------------------------------------

    fn current_logger(&self) -> Option<SharedLogger> {
        if let Some(logger) = &self.logger {
            return Some(logger.clone());
        }
        // Probe the host once, remembering "none" as well as "present"
        self.probed_logger
            .get_or_init(|| self.config.logger.clone())
            .clone()
    }

    /// Bind the configured logger to a pool, if there is one.
    fn bind_logger(&self, pool: &SharedPool) {
        if let Some(logger) = self.current_logger() {
            pool.set_logger(logger);
        }
    }

    // -------------------------------------------------------------------------
    // Pool factory
    // -------------------------------------------------------------------------

    /// The driver backing the application pool.
    ///
    /// Uses the override when one was supplied (declarative configs are
    /// built exactly once); otherwise maps the host's cache mechanism.
    pub fn application_driver(&self) -> Result<SharedDriver> {
        match &self.driver_source {
            Some(DriverSource::Instance(driver)) => Ok(driver.clone()),
            Some(DriverSource::Config(config)) => self
                .built_driver
                .get_or_try_init(|| config.build())
                .cloned(),
            None => resolve_driver(&self.config).build(),
        }
    }

    /// Build the application pool: mapped driver, configured item duration,
    /// bound logger. Driver construction failures propagate.
    pub fn build_application_pool(&self) -> Result<SharedPool> {
        let pool = Pool::new(self.application_driver()?);
        pool.set_item_duration(self.config.item_duration());

        let pool: SharedPool = Arc::new(pool);
        self.bind_logger(&pool);
        Ok(pool)
    }

    /// Build a dummy pool: black-hole driver, bound logger, never fails.
    pub fn build_dummy_pool(&self) -> SharedPool {
        let pool: SharedPool = Arc::new(Pool::new(Arc::new(BlackHoleDriver)));
        self.bind_logger(&pool);
        pool
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Resolve every registered pool.
    ///
    /// Seeds `default` and `dummy`, folds the providers over the set in
    /// order, then resolves each descriptor. Handles whose descriptor is
    /// malformed or names no pool are dropped (absent, not null);
    /// construction failures abort the call.
    pub fn find_all(&self) -> Result<PoolMap> {
        let mut set = PoolSet::new();
        set.add(
            DEFAULT_HANDLE,
            PoolDescriptor::Instance(self.build_application_pool()?),
        );
        set.add(DUMMY_HANDLE, PoolDescriptor::Instance(self.build_dummy_pool()));

        for provider in &self.providers {
            set = provider.provide(set);
        }

        let mut pools = PoolMap::new();
        for (handle, descriptor) in set {
            match self.kinds.resolve(descriptor) {
                Ok(pool) => {
                    pools.insert(handle, pool);
                }
                Err(ResolveError::Construction(e)) => return Err(e),
                Err(_) => {
                    // Already logged at error level by the resolver
                    debug!(handle = %handle, "dropping unresolvable cache pool handle");
                }
            }
        }
        Ok(pools)
    }

    /// Look up a pool by handle.
    ///
    /// A missing handle logs an error and yields a freshly built dummy
    /// pool; consumers never receive a null pool. Only construction
    /// failures surface as errors.
    pub fn get(&self, handle: &str) -> Result<SharedPool> {
        let pools = self.find_all()?;

        if let Some(pool) = pools.get(handle) {
            return Ok(pool.clone());
        }

        error!(handle = %handle, "cache pool does not exist");
        Ok(self.build_dummy_pool())
    }

    /// The application pool.
    pub fn default_pool(&self) -> Result<SharedPool> {
        self.get(DEFAULT_HANDLE)
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("config", &self.config)
            .field("kinds", &self.kinds)
            .field("providers", &self.providers.len())
            .field("driver_source", &self.driver_source)
            .finish()
    }
}
