//! Pool Descriptors and Resolution
//!
//! A descriptor is anything a pool can be made from: an already-built
//! instance, a zero-argument factory producing another descriptor, or a
//! declarative JSON config naming a registered pool kind plus constructor
//! arguments. [`KindRegistry::resolve`] normalizes one descriptor into a
//! ready pool or a typed failure; a failing descriptor never takes the rest
//! of a batch down with it (construction defects excepted).

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::driver::DriverConfig;
use crate::error::{Error, Result};
use crate::pool::{CachePool, Pool, SharedPool};

/// Config key naming the pool kind
const KIND_KEY: &str = "class";
/// Fallback config key when `class` is absent
const KIND_KEY_FALLBACK: &str = "type";

/// JSON object map used for constructor arguments
pub type JsonMap = serde_json::Map<String, Value>;

/// Zero-argument factory producing another descriptor
pub type PoolFactoryFn = Arc<dyn Fn() -> PoolDescriptor + Send + Sync>;

/// Constructor registered for one pool kind
pub type PoolConstructor = Arc<dyn Fn(&JsonMap) -> Result<SharedPool> + Send + Sync>;

// =============================================================================
// Pool Descriptor
// =============================================================================

/// Anything a pool can be resolved from.
#[derive(Clone)]
pub enum PoolDescriptor {
    /// Already-constructed pool, returned as-is
    Instance(SharedPool),
    /// Deferred descriptor; invoked exactly once, one level deep
    Factory(PoolFactoryFn),
    /// Declarative config: a kind string, or a map with a `class`/`type`
    /// key plus constructor arguments
    Config(Value),
}

impl PoolDescriptor {
    /// Descriptor deferring to a factory.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn() -> PoolDescriptor + Send + Sync + 'static,
    {
        PoolDescriptor::Factory(Arc::new(f))
    }

    /// Descriptor naming a registered kind with no arguments.
    pub fn kind(kind: impl Into<String>) -> Self {
        PoolDescriptor::Config(Value::String(kind.into()))
    }
}

impl std::fmt::Debug for PoolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolDescriptor::Instance(_) => f.write_str("Instance(..)"),
            PoolDescriptor::Factory(_) => f.write_str("Factory(..)"),
            PoolDescriptor::Config(value) => f.debug_tuple("Config").field(value).finish(),
        }
    }
}

impl From<SharedPool> for PoolDescriptor {
    fn from(pool: SharedPool) -> Self {
        PoolDescriptor::Instance(pool)
    }
}

impl From<Pool> for PoolDescriptor {
    fn from(pool: Pool) -> Self {
        PoolDescriptor::Instance(Arc::new(pool))
    }
}

impl From<&str> for PoolDescriptor {
    fn from(kind: &str) -> Self {
        PoolDescriptor::kind(kind)
    }
}

impl From<String> for PoolDescriptor {
    fn from(kind: String) -> Self {
        PoolDescriptor::kind(kind)
    }
}

impl From<Value> for PoolDescriptor {
    fn from(value: Value) -> Self {
        PoolDescriptor::Config(value)
    }
}

// =============================================================================
// Resolution Failures
// =============================================================================

/// Why one descriptor failed to resolve.
///
/// `MissingKind` and `NotAPool` drop only the offending handle;
/// `Construction` signals a configuration defect and aborts the batch.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The config names no pool kind at all
    #[error("could not find a pool kind in config: {config}")]
    MissingKind { config: String },

    /// The named kind is not a registered pool constructor
    #[error("'{kind}' is not a registered pool kind")]
    NotAPool { kind: String },

    /// A registered constructor failed
    #[error(transparent)]
    Construction(#[from] Error),
}

// =============================================================================
// Kind Registry
// =============================================================================

/// Registry of pool kinds: kind identifier -> constructor.
///
/// The declarative half of descriptor resolution. Registration validates
/// eagerly (empty and duplicate identifiers are rejected); whether a
/// descriptor names a known kind is only decidable at resolution time.
#[derive(Clone)]
pub struct KindRegistry {
    kinds: IndexMap<String, PoolConstructor>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Arguments accepted by the built-in `pool` kind
#[derive(Debug, Deserialize)]
struct PoolKindArgs {
    #[serde(default = "default_pool_driver")]
    driver: DriverConfig,
    #[serde(default)]
    duration_seconds: Option<u64>,
}

fn default_pool_driver() -> DriverConfig {
    DriverConfig::BlackHole
}

impl KindRegistry {
    /// An empty registry with no kinds at all.
    pub fn empty() -> Self {
        Self {
            kinds: IndexMap::new(),
        }
    }

    /// A registry pre-loaded with the built-in `pool` kind.
    ///
    /// `pool` accepts `{ "driver": DriverConfig, "duration_seconds": u64 }`,
    /// both optional; the default driver is the black hole.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry
            .register("pool", |args: &JsonMap| {
                let args: PoolKindArgs = serde_json::from_value(Value::Object(args.clone()))
                    .map_err(|e| Error::Construction {
                        kind: "pool".into(),
                        reason: e.to_string(),
                    })?;
                let driver = args.driver.build().map_err(|e| Error::Construction {
                    kind: "pool".into(),
                    reason: e.to_string(),
                })?;
                let pool = Pool::new(driver);
                if let Some(seconds) = args.duration_seconds {
                    pool.set_item_duration(Some(std::time::Duration::from_secs(seconds)));
                }
                Ok(Arc::new(pool) as SharedPool)
            })
            .unwrap_or_else(|_| unreachable!("fresh registry cannot hold duplicates"));
        registry
    }

    /// Register a pool kind.
    ///
    /// Empty and duplicate identifiers are rejected here, at registration
    /// time, rather than surfacing later during resolution.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn(&JsonMap) -> Result<SharedPool> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(Error::InvalidKind(kind));
        }
        if self.kinds.contains_key(&kind) {
            return Err(Error::DuplicateKind(kind));
        }
        self.kinds.insert(kind, Arc::new(constructor));
        Ok(())
    }

    /// Whether a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kind identifiers, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// Resolve one descriptor into a ready pool.
    ///
    /// In order: a factory is invoked exactly once and its result takes the
    /// descriptor's place (one level only); an instance passes through
    /// untouched; a config has its kind extracted (`class`, then `type`),
    /// looked up and constructed with the remaining entries as arguments.
    pub fn resolve(
        &self,
        descriptor: PoolDescriptor,
    ) -> std::result::Result<SharedPool, ResolveError> {
        // One level of factory indirection only
        let descriptor = match descriptor {
            PoolDescriptor::Factory(f) => f(),
            other => other,
        };

        let value = match descriptor {
            PoolDescriptor::Instance(pool) => return Ok(pool),
            PoolDescriptor::Factory(_) => {
                // A factory returning another factory is not re-invoked
                let err = ResolveError::NotAPool {
                    kind: "factory".into(),
                };
                error!(error = %err, "cache pool factory returned another factory");
                return Err(err);
            }
            PoolDescriptor::Config(value) => value,
        };

        let (kind, args) = match extract_kind(&value) {
            Some(parts) => parts,
            None => {
                let config =
                    serde_json::to_string(&value).unwrap_or_else(|_| format!("{:?}", value));
                error!(config = %config, "could not find a pool kind in config");
                return Err(ResolveError::MissingKind { config });
            }
        };

        let Some(constructor) = self.kinds.get(&kind) else {
            let err = ResolveError::NotAPool { kind };
            error!(error = %err, "descriptor does not name a registered pool kind");
            return Err(err);
        };

        Ok(constructor(&args)?)
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Pull the kind identifier and constructor arguments out of a config value.
///
/// A bare string is the kind with no arguments. A map takes its kind from
/// `class`, falling back to `type`; both keys are stripped from the
/// arguments so constructors never see routing keys. Anything else has no
/// kind.
fn extract_kind(value: &Value) -> Option<(String, JsonMap)> {
    match value {
        Value::String(kind) => Some((kind.clone(), JsonMap::new())),
        Value::Object(map) => {
            let kind = map
                .get(KIND_KEY)
                .or_else(|| map.get(KIND_KEY_FALLBACK))
                .and_then(Value::as_str)?
                .to_string();
            let args: JsonMap = map
                .iter()
                .filter(|(key, _)| key.as_str() != KIND_KEY && key.as_str() != KIND_KEY_FALLBACK)
                .map(|(key, val)| (key.clone(), val.clone()))
                .collect();
            Some((kind, args))
        }
        _ => None,
    }
}
