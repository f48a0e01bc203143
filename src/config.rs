//! Host Configuration
//!
//! An explicit configuration struct passed into the registry, carrying the
//! configured cache mechanism, the default item duration, filesystem path
//! aliases and an optional host logger. There is no ambient global state;
//! everything the registry needs arrives through [`HostConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::logger::SharedLogger;

/// Default item duration when none is configured (one day)
const DEFAULT_CACHE_DURATION_SECONDS: u64 = 86_400;

// =============================================================================
// Cache Mechanism
// =============================================================================

/// The host's configured cache mechanism.
///
/// An introspectable descriptor whose concrete variant determines the
/// storage driver mapping. Only `FileCache` maps to a real driver; every
/// other mechanism degrades to the black-hole driver with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "snake_case")]
pub enum CacheMechanism {
    /// Filesystem-backed cache; `cache_path` may use an `@alias` prefix
    FileCache { cache_path: String },
    /// Memcached servers (unsupported by this registry)
    Memcached { servers: Vec<String> },
    /// Redis endpoint (unsupported by this registry)
    Redis { url: String },
    /// Any other mechanism, identified by name (unsupported)
    Custom { name: String },
}

impl CacheMechanism {
    /// Human-readable mechanism name, used in log messages
    pub fn name(&self) -> &str {
        match self {
            CacheMechanism::FileCache { .. } => "file-cache",
            CacheMechanism::Memcached { .. } => "memcached",
            CacheMechanism::Redis { .. } => "redis",
            CacheMechanism::Custom { name } => name,
        }
    }
}

impl Default for CacheMechanism {
    fn default() -> Self {
        CacheMechanism::FileCache {
            cache_path: "@runtime/cache".to_string(),
        }
    }
}

// =============================================================================
// Host Configuration
// =============================================================================

/// Host configuration for the cache registry.
#[derive(Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// The configured default cache mechanism
    #[serde(default)]
    pub mechanism: CacheMechanism,
    /// Default item duration in seconds (0 = entries never expire)
    #[serde(default = "default_cache_duration")]
    pub cache_duration_seconds: u64,
    /// Path aliases, e.g. `@runtime` -> `/var/lib/app/runtime`
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Optional host logger service bound to pools
    #[serde(skip)]
    pub logger: Option<SharedLogger>,
}

fn default_cache_duration() -> u64 {
    DEFAULT_CACHE_DURATION_SECONDS
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mechanism: CacheMechanism::default(),
            cache_duration_seconds: default_cache_duration(),
            aliases: BTreeMap::new(),
            logger: None,
        }
    }
}

impl std::fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConfig")
            .field("mechanism", &self.mechanism)
            .field("cache_duration_seconds", &self.cache_duration_seconds)
            .field("aliases", &self.aliases)
            .field("logger", &self.logger.as_ref().map(|_| "<logger>"))
            .finish()
    }
}

impl HostConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Set the cache mechanism.
    pub fn with_mechanism(mut self, mechanism: CacheMechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// Set the default item duration in seconds (0 = no expiry).
    pub fn with_cache_duration(mut self, seconds: u64) -> Self {
        self.cache_duration_seconds = seconds;
        self
    }

    /// Register a path alias, e.g. `@runtime` -> `/var/lib/app/runtime`.
    pub fn with_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    /// Set the host logger service.
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The default item duration, or `None` when entries never expire.
    pub fn item_duration(&self) -> Option<Duration> {
        if self.cache_duration_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.cache_duration_seconds))
        }
    }

    /// Resolve a path that may start with an `@alias` prefix.
    ///
    /// The longest registered alias matching a path-segment boundary wins.
    /// A path with no matching alias passes through unchanged; driver
    /// construction will surface an unusable literal path later.
    pub fn resolve_alias(&self, path: &str) -> PathBuf {
        if !path.starts_with('@') {
            return PathBuf::from(path);
        }

        let matched = self
            .aliases
            .iter()
            .filter(|(alias, _)| {
                path.starts_with(alias.as_str())
                    && (path.len() == alias.len() || path.as_bytes()[alias.len()] == b'/')
            })
            .max_by_key(|(alias, _)| alias.len());

        match matched {
            Some((alias, target)) => PathBuf::from(format!("{}{}", target, &path[alias.len()..])),
            None => {
                debug!(path = %path, "no registered alias matches; using path literally");
                PathBuf::from(path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mechanism_is_file_cache() {
        let config = HostConfig::default();
        assert_eq!(config.mechanism.name(), "file-cache");
        assert_eq!(config.cache_duration_seconds, 86_400);
    }

    #[test]
    fn test_item_duration_zero_means_no_expiry() {
        let config = HostConfig::new().with_cache_duration(0);
        assert_eq!(config.item_duration(), None);

        let config = HostConfig::new().with_cache_duration(60);
        assert_eq!(config.item_duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_alias_resolution_longest_prefix_wins() {
        let config = HostConfig::new()
            .with_alias("@runtime", "/var/runtime")
            .with_alias("@runtime/cache", "/fast/cache");

        assert_eq!(
            config.resolve_alias("@runtime/cache/objects"),
            PathBuf::from("/fast/cache/objects")
        );
        assert_eq!(
            config.resolve_alias("@runtime/logs"),
            PathBuf::from("/var/runtime/logs")
        );
    }

    #[test]
    fn test_alias_requires_segment_boundary() {
        let config = HostConfig::new().with_alias("@run", "/var/run");

        // "@runtime" must not match alias "@run"
        assert_eq!(
            config.resolve_alias("@runtime/cache"),
            PathBuf::from("@runtime/cache")
        );
    }

    #[test]
    fn test_unknown_alias_passes_through() {
        let config = HostConfig::new();
        assert_eq!(
            config.resolve_alias("@nowhere/cache"),
            PathBuf::from("@nowhere/cache")
        );
        assert_eq!(config.resolve_alias("/plain/path"), PathBuf::from("/plain/path"));
    }

    #[test]
    fn test_yaml_loading() {
        let yaml = r#"
mechanism:
  mechanism: redis
  url: "redis://localhost:6379"
cache_duration_seconds: 300
aliases:
  "@runtime": /tmp/runtime
"#;
        let config = HostConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.mechanism.name(), "redis");
        assert_eq!(config.cache_duration_seconds, 300);
        assert_eq!(config.aliases["@runtime"], "/tmp/runtime");
    }

    #[test]
    fn test_yaml_defaults() {
        let config = HostConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.mechanism, CacheMechanism::default());
        assert_eq!(config.cache_duration_seconds, 86_400);
    }
}
