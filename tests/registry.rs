//! Registry Integration Tests
//!
//! End-to-end coverage of the resolution pipeline:
//! - Built-in pool assembly and driver mapping
//! - Provider-based extension (add, overwrite, remove)
//! - Descriptor resolution failure handling
//! - Handle lookup with the no-op fallback

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tempfile::TempDir;

use poolstash::{
    CacheMechanism, CacheRegistry, DriverConfig, DriverSource, HostConfig,
    MemoryDriver, MemoryLogger, PoolSet, SharedPool, DEFAULT_HANDLE, DUMMY_HANDLE,
};

/// Install a test subscriber once so degrade-and-log paths are visible
/// under `RUST_LOG=poolstash=debug`.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Host config whose mechanism has no driver mapping (black-hole default)
fn unsupported_host() -> HostConfig {
    init_tracing();
    HostConfig::new().with_mechanism(CacheMechanism::Custom {
        name: "unsupported".into(),
    })
}

/// Host config backed by a temp directory via an alias
fn file_host(dir: &TempDir) -> HostConfig {
    init_tracing();
    HostConfig::new()
        .with_alias("@runtime", dir.path().to_string_lossy())
        .with_mechanism(CacheMechanism::FileCache {
            cache_path: "@runtime/cache".into(),
        })
}

// =============================================================================
// Built-In Pool Assembly
// =============================================================================

mod builtin_pools {
    use super::*;

    #[test]
    fn test_find_all_contains_default_and_dummy() {
        let registry = CacheRegistry::new(unsupported_host());

        let pools = registry.find_all().unwrap();
        assert!(pools.contains_key(DEFAULT_HANDLE));
        assert!(pools.contains_key(DUMMY_HANDLE));
        assert_eq!(pools.len(), 2);
    }

    #[test]
    fn test_default_pool_maps_file_cache_to_filesystem_driver() {
        let dir = TempDir::new().unwrap();
        let registry = CacheRegistry::new(file_host(&dir));

        let pool = registry.get(DEFAULT_HANDLE).unwrap();
        assert_eq!(pool.driver_name(), Some("filesystem"));

        // The pool is usable end to end
        pool.set("greeting", Bytes::from("hello")).unwrap();
        assert_eq!(pool.get("greeting"), Some(Bytes::from("hello")));
    }

    #[test]
    fn test_unsupported_mechanism_degrades_to_black_hole() {
        let registry = CacheRegistry::new(unsupported_host());

        let pool = registry.get(DEFAULT_HANDLE).unwrap();
        assert_eq!(pool.driver_name(), Some("black-hole"));

        // Usable, just forgetful
        pool.set("k", Bytes::from("v")).unwrap();
        assert_eq!(pool.get("k"), None);
    }

    #[test]
    fn test_dummy_pool_carries_driver_and_logger() {
        let logger = Arc::new(MemoryLogger::new());
        let config = unsupported_host().with_logger(logger);
        let registry = CacheRegistry::new(config);

        let pools = registry.find_all().unwrap();
        let dummy = &pools[DUMMY_HANDLE];
        assert_eq!(dummy.driver_name(), Some("black-hole"));
        assert!(dummy.has_logger());
    }

    #[test]
    fn test_explicit_registry_logger_wins_over_host_logger() {
        let config = unsupported_host().with_logger(Arc::new(MemoryLogger::new()));
        let mut registry = CacheRegistry::new(config);
        registry.set_logger(Arc::new(MemoryLogger::new()));

        let pool = registry.build_application_pool().unwrap();
        assert!(pool.has_logger());
    }

    #[test]
    fn test_repeated_find_all_is_stable() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add("extra", json!({ "class": "pool" }));
            pools
        });

        let first: Vec<String> = registry.find_all().unwrap().keys().cloned().collect();
        let second: Vec<String> = registry.find_all().unwrap().keys().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["default", "dummy", "extra"]);
    }
}

// =============================================================================
// Provider Extension
// =============================================================================

mod providers {
    use super::*;

    #[test]
    fn test_provider_adds_a_declarative_pool() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add(
                "redis",
                json!({
                    "class": "pool",
                    "driver": { "backend": "memory" },
                    "duration_seconds": 120,
                }),
            );
            pools
        });

        let pool = registry.get("redis").unwrap();
        assert_eq!(pool.driver_name(), Some("memory"));

        pool.set("session", Bytes::from("state")).unwrap();
        assert_eq!(pool.get("session"), Some(Bytes::from("state")));
    }

    #[test]
    fn test_provider_adds_an_instance() {
        let shared: SharedPool = Arc::new(poolstash::Pool::new(Arc::new(MemoryDriver::new())));

        let mut registry = CacheRegistry::new(unsupported_host());
        let provided = shared.clone();
        registry.register_provider(move |mut pools: PoolSet| {
            pools.add("shared", provided.clone());
            pools
        });

        // Instances pass through identity-preserving
        let resolved = registry.get("shared").unwrap();
        assert!(Arc::ptr_eq(&shared, &resolved));
    }

    #[test]
    fn test_provider_adds_a_factory_invoked_per_cycle() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add(
                "lazy",
                poolstash::PoolDescriptor::factory(|| {
                    poolstash::PoolDescriptor::Config(json!({
                        "class": "pool",
                        "driver": { "backend": "memory" },
                    }))
                }),
            );
            pools
        });

        let pool = registry.get("lazy").unwrap();
        assert_eq!(pool.driver_name(), Some("memory"));
    }

    #[test]
    fn test_providers_run_in_order_later_wins() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add("contested", json!({ "class": "pool" }));
            pools
        });
        registry.register_provider(|mut pools: PoolSet| {
            pools.add(
                "contested",
                json!({ "class": "pool", "driver": { "backend": "memory" } }),
            );
            pools
        });

        let pool = registry.get("contested").unwrap();
        assert_eq!(pool.driver_name(), Some("memory"));
    }

    #[test]
    fn test_provider_may_remove_builtins() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.remove(DUMMY_HANDLE);
            pools
        });

        let pools = registry.find_all().unwrap();
        assert!(pools.contains_key(DEFAULT_HANDLE));
        assert!(!pools.contains_key(DUMMY_HANDLE));
    }

    #[test]
    fn test_provider_may_overwrite_default() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add(
                DEFAULT_HANDLE,
                json!({ "class": "pool", "driver": { "backend": "memory" } }),
            );
            pools
        });

        let pool = registry.get(DEFAULT_HANDLE).unwrap();
        assert_eq!(pool.driver_name(), Some("memory"));
    }
}

// =============================================================================
// Failure Handling
// =============================================================================

mod failures {
    use super::*;

    #[test]
    fn test_broken_descriptor_is_dropped_not_fatal() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add("broken", json!({ "class": "int" }));
            pools.add("working", json!({ "class": "pool" }));
            pools
        });

        let pools = registry.find_all().unwrap();
        assert!(!pools.contains_key("broken"));
        assert!(pools.contains_key("working"));
    }

    #[test]
    fn test_kindless_descriptor_is_dropped() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add("nameless", json!({ "path": "/somewhere" }));
            pools
        });

        assert!(!registry.find_all().unwrap().contains_key("nameless"));
    }

    #[test]
    fn test_get_on_dropped_handle_returns_dummy_capability() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add("broken", json!({ "class": "int" }));
            pools
        });

        let pool = registry.get("broken").unwrap();
        assert_eq!(pool.driver_name(), Some("black-hole"));
        pool.set("k", Bytes::from("v")).unwrap();
        assert_eq!(pool.get("k"), None);
    }

    #[test]
    fn test_get_missing_handle_never_errors() {
        let registry = CacheRegistry::new(unsupported_host());

        let pool = registry.get("missing").unwrap();
        assert_eq!(pool.driver_name(), Some("black-hole"));
    }

    #[test]
    fn test_missing_handle_fallback_is_a_fresh_instance() {
        let registry = CacheRegistry::new(unsupported_host());

        let dummy = registry.find_all().unwrap()[DUMMY_HANDLE].clone();
        let fallback = registry.get("missing").unwrap();
        assert!(!Arc::ptr_eq(&dummy, &fallback));
    }

    #[test]
    fn test_construction_failure_aborts_the_call() {
        let dir = TempDir::new().unwrap();
        let occupied = dir.path().join("occupied");
        std::fs::write(&occupied, b"not a directory").unwrap();

        let mut registry = CacheRegistry::new(unsupported_host());
        let bad_path = occupied.join("cache");
        registry.register_provider(move |mut pools: PoolSet| {
            pools.add(
                "defective",
                json!({
                    "class": "pool",
                    "driver": { "backend": "file_system", "path": &bad_path },
                }),
            );
            pools
        });

        assert!(registry.find_all().is_err());
        assert!(registry.get(DEFAULT_HANDLE).is_err());
    }
}

// =============================================================================
// Log Emission
// =============================================================================

mod log_emission {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{span, Event, Level, Metadata};

    /// Subscriber counting warn/error events, for once-per-call assertions.
    #[derive(Clone, Default)]
    struct LevelCounter {
        warns: Arc<AtomicUsize>,
        errors: Arc<AtomicUsize>,
    }

    impl tracing::Subscriber for LevelCounter {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _attrs: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }
        fn record(&self, _id: &span::Id, _values: &span::Record<'_>) {}
        fn record_follows_from(&self, _id: &span::Id, _follows: &span::Id) {}
        fn event(&self, event: &Event<'_>) {
            match *event.metadata().level() {
                Level::WARN => {
                    self.warns.fetch_add(1, Ordering::SeqCst);
                }
                Level::ERROR => {
                    self.errors.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
        fn enter(&self, _id: &span::Id) {}
        fn exit(&self, _id: &span::Id) {}
    }

    fn counted<R>(f: impl FnOnce() -> R) -> (R, usize, usize) {
        let counter = LevelCounter::default();
        let result = tracing::subscriber::with_default(counter.clone(), f);
        (
            result,
            counter.warns.load(Ordering::SeqCst),
            counter.errors.load(Ordering::SeqCst),
        )
    }

    #[test]
    fn test_unsupported_mechanism_warns_once_per_build() {
        let registry = CacheRegistry::new(unsupported_host());

        let (_, warns, _) = counted(|| registry.build_application_pool().unwrap());
        assert_eq!(warns, 1);

        let (_, warns, _) = counted(|| {
            registry.build_application_pool().unwrap();
            registry.build_application_pool().unwrap();
        });
        assert_eq!(warns, 2);
    }

    #[test]
    fn test_bad_descriptor_logs_exactly_one_error() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add("broken", json!({ "class": "int" }));
            pools
        });

        let (pools, _, errors) = counted(|| registry.find_all().unwrap());
        assert!(!pools.contains_key("broken"));
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_kindless_descriptor_logs_exactly_one_error() {
        let mut registry = CacheRegistry::new(unsupported_host());
        registry.register_provider(|mut pools: PoolSet| {
            pools.add("nameless", json!({ "path": "/somewhere" }));
            pools
        });

        let (_, _, errors) = counted(|| registry.find_all().unwrap());
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_missing_handle_logs_exactly_one_error() {
        let registry = CacheRegistry::new(unsupported_host());

        let (_, _, errors) = counted(|| registry.get("missing").unwrap());
        assert_eq!(errors, 1);
    }
}

// =============================================================================
// Driver Override
// =============================================================================

mod driver_override {
    use super::*;

    #[test]
    fn test_instance_override_is_used_as_is() {
        let driver: poolstash::SharedDriver = Arc::new(MemoryDriver::new());

        let mut registry = CacheRegistry::new(unsupported_host());
        registry.set_driver(DriverSource::Instance(driver.clone()));

        let used = registry.application_driver().unwrap();
        assert!(Arc::ptr_eq(&driver, &used));

        let pool = registry.get(DEFAULT_HANDLE).unwrap();
        assert_eq!(pool.driver_name(), Some("memory"));
    }

    #[test]
    fn test_config_override_is_built_exactly_once() {
        let dir = TempDir::new().unwrap();

        let mut registry = CacheRegistry::new(unsupported_host());
        registry.set_driver(DriverSource::Config(DriverConfig::FileSystem {
            path: dir.path().join("cache"),
        }));

        let first = registry.application_driver().unwrap();
        let second = registry.application_driver().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Both built-in pools across cycles share the cached driver
        registry.find_all().unwrap();
        let third = registry.application_driver().unwrap();
        assert!(Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_replacing_a_config_override_discards_the_built_driver() {
        let dir = TempDir::new().unwrap();

        let mut registry = CacheRegistry::new(unsupported_host());
        registry.set_driver(DriverSource::Config(DriverConfig::FileSystem {
            path: dir.path().join("first"),
        }));
        let first = registry.application_driver().unwrap();

        registry.set_driver(DriverSource::Config(DriverConfig::FileSystem {
            path: dir.path().join("second"),
        }));
        let second = registry.application_driver().unwrap();

        // The stale driver is gone, and the replacement is cached in turn
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &registry.application_driver().unwrap()));
    }

    #[test]
    fn test_without_override_each_cycle_builds_fresh() {
        let registry = CacheRegistry::new(unsupported_host());

        let first = registry.application_driver().unwrap();
        let second = registry.application_driver().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
