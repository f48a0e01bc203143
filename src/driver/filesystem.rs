//! Filesystem Driver
//!
//! File-per-key persistent store. Keys are spread over 256 hash-sharded
//! subdirectories; file names stay human-readable via a hash prefix plus a
//! truncated url-encoded key. Each file carries a length-prefixed JSON
//! header (full key, timestamps, compression, content hash) followed by the
//! payload. Writes go to a temp file and are renamed into place; corrupt or
//! mismatched files read as misses, never as errors.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{Driver, StoredEntry};
use crate::compression::{CompressionAlgorithm, CompressionConfig, CompressionManager};
use crate::error::Result;

/// Number of shard subdirectories (must stay a power of two)
const SHARD_COUNT: u64 = 256;

/// Longest url-encoded key fragment kept in a file name
const MAX_NAME_FRAGMENT: usize = 48;

/// File extension for stored entries
const ENTRY_EXT: &str = "entry";

/// Prefix of in-flight write files awaiting rename
const TEMP_PREFIX: &str = ".tmp-";

// =============================================================================
// Configuration
// =============================================================================

/// Filesystem driver configuration
#[derive(Debug, Clone)]
pub struct FileSystemConfig {
    /// Root directory for all entries
    pub root: PathBuf,
    /// Compression settings for stored payloads
    pub compression: CompressionConfig,
    /// Age after which an orphaned temp file is swept by `purge`.
    /// Young temp files may belong to an in-flight write.
    pub stale_temp_age: std::time::Duration,
}

impl FileSystemConfig {
    /// Configuration rooted at `root` with default compression.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: CompressionConfig::default(),
            stale_temp_age: std::time::Duration::from_secs(3600),
        }
    }
}

// =============================================================================
// On-Disk Entry Layout
// =============================================================================

/// Per-file header, stored as JSON behind a 4-byte little-endian length.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    /// Full key (file names are truncated, this is authoritative)
    key: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    /// How the payload that follows is compressed
    compression: CompressionAlgorithm,
    /// Hash of the uncompressed payload, for integrity
    content_hash: u64,
}

/// Fast non-cryptographic hash (FxHash algorithm)
#[inline]
fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

// =============================================================================
// Filesystem Driver
// =============================================================================

/// File-per-key storage driver.
pub struct FileSystemDriver {
    config: FileSystemConfig,
    compression: CompressionManager,
}

impl FileSystemDriver {
    /// Create a driver rooted at `root`, creating the directory if needed.
    ///
    /// An unusable root is a configuration defect and fails construction.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(FileSystemConfig::new(root.as_ref()))
    }

    /// Create a driver from a full configuration.
    pub fn with_config(config: FileSystemConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        let compression = CompressionManager::with_config(config.compression.clone());
        Ok(Self {
            config,
            compression,
        })
    }

    /// The driver's root directory.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn shard_dir(&self, key_hash: u64) -> PathBuf {
        self.config
            .root
            .join(format!("{:02x}", key_hash & (SHARD_COUNT - 1)))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let key_hash = fx_hash(key.as_bytes());
        let mut fragment = urlencoding::encode(key).into_owned();
        fragment.truncate(MAX_NAME_FRAGMENT);
        self.shard_dir(key_hash)
            .join(format!("{:016x}-{}.{}", key_hash, fragment, ENTRY_EXT))
    }

    /// Read and validate one entry file. `None` means miss: absent,
    /// corrupt, colliding or failing its integrity check.
    fn read_entry(&self, path: &Path, key: &str) -> Option<StoredEntry> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache file, treating as miss");
                return None;
            }
        };

        if raw.len() < 4 {
            warn!(path = %path.display(), "truncated cache file, treating as miss");
            return None;
        }
        let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() < 4 + header_len {
            warn!(path = %path.display(), "truncated cache file, treating as miss");
            return None;
        }

        let header: EntryHeader = match serde_json::from_slice(&raw[4..4 + header_len]) {
            Ok(header) => header,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache header, treating as miss");
                return None;
            }
        };

        // Truncated file names can collide; the header key is authoritative
        if header.key != key {
            warn!(
                path = %path.display(),
                expected = %key,
                found = %header.key,
                "cache file key mismatch, treating as miss"
            );
            return None;
        }

        let payload = match self
            .compression
            .decompress(&raw[4 + header_len..], header.compression)
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to decompress cache file, treating as miss");
                return None;
            }
        };

        if fx_hash(&payload) != header.content_hash {
            warn!(path = %path.display(), "cache file failed integrity check, treating as miss");
            return None;
        }

        Some(StoredEntry {
            data: payload,
            created_at: header.created_at,
            expires_at: header.expires_at,
        })
    }

    fn write_entry(&self, path: &Path, key: &str, entry: &StoredEntry) -> Result<()> {
        let (payload, algorithm) = self.compression.compress(&entry.data)?;
        let header = EntryHeader {
            key: key.to_string(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            compression: algorithm,
            content_hash: fx_hash(&entry.data),
        };
        let header_bytes = serde_json::to_vec(&header)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a temp file, then rename into place for atomic visibility
        let temp = self
            .config
            .root
            .join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4().simple()));
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
            file.write_all(&header_bytes)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Walk every entry file under the root.
    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for shard in fs::read_dir(&self.config.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for file in fs::read_dir(shard.path())? {
                let path = file?.path();
                if path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    /// Remove temp files orphaned by a crash between create and rename.
    /// `max_age: None` sweeps them all; otherwise only those whose last
    /// modification is older than `max_age`, sparing in-flight writes.
    fn sweep_temp_files(&self, max_age: Option<std::time::Duration>) {
        let Ok(entries) = fs::read_dir(&self.config.root) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(TEMP_PREFIX));
            if !is_temp {
                continue;
            }
            let stale = match max_age {
                None => true,
                Some(age) => entry
                    .metadata()
                    .and_then(|meta| meta.modified())
                    .ok()
                    .and_then(|modified| modified.elapsed().ok())
                    .is_some_and(|elapsed| elapsed >= age),
            };
            if stale {
                let _ = fs::remove_file(&path);
            }
        }
    }

    /// Read just the header of an entry file.
    fn read_header(path: &Path) -> Option<EntryHeader> {
        let raw = fs::read(path).ok()?;
        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() < 4 + header_len {
            return None;
        }
        serde_json::from_slice(&raw[4..4 + header_len]).ok()
    }
}

impl Driver for FileSystemDriver {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let path = self.entry_path(key);
        match self.read_entry(&path, key) {
            Some(entry) if entry.is_expired() => {
                let _ = fs::remove_file(&path);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn put(&self, key: &str, entry: StoredEntry) -> Result<()> {
        let path = self.entry_path(key);
        self.write_entry(&path, key, &entry)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<()> {
        for shard in fs::read_dir(&self.config.root)? {
            let shard = shard?;
            if shard.file_type()?.is_dir() {
                fs::remove_dir_all(shard.path())?;
            }
        }
        self.sweep_temp_files(None);
        Ok(())
    }

    fn purge(&self) -> Result<u64> {
        let mut removed = 0u64;
        for path in self.entry_files()? {
            let expired = Self::read_header(&path)
                .and_then(|header| header.expires_at)
                .is_some_and(|at| Utc::now() >= at);
            if expired && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        self.sweep_temp_files(Some(self.config.stale_temp_age));
        Ok(removed)
    }
}
