//! In-Memory Driver
//!
//! Concurrent in-process storage backed by a sharded map, with atomic
//! operation counters for inspection.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{Driver, StoredEntry};
use crate::error::Result;

/// In-memory driver statistics
#[derive(Debug, Clone, Default)]
pub struct MemoryDriverStats {
    /// Entries currently stored
    pub entry_count: u64,
    /// Payload bytes currently stored
    pub total_bytes: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

/// In-memory storage driver.
///
/// Uses DashMap for lock-free concurrent access. Expired entries read as
/// misses and are dropped on access.
pub struct MemoryDriver {
    storage: DashMap<String, StoredEntry>,
    entry_count: AtomicU64,
    total_bytes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            entry_count: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl MemoryDriver {
    /// Create a new in-memory driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the driver's counters.
    pub fn stats(&self) -> MemoryDriverStats {
        MemoryDriverStats {
            entry_count: self.entry_count.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn account_removal(&self, entry: &StoredEntry) {
        self.entry_count.fetch_sub(1, Ordering::Relaxed);
        self.total_bytes
            .fetch_sub(entry.data.len() as u64, Ordering::Relaxed);
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.storage.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value().clone()));
            }
        } else {
            return Ok(None);
        }

        // Expired: drop it so the map does not accumulate dead entries
        if let Some((_, old)) = self.storage.remove(key) {
            self.account_removal(&old);
        }
        Ok(None)
    }

    fn put(&self, key: &str, entry: StoredEntry) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let size = entry.data.len() as u64;
        match self.storage.insert(key.to_string(), entry) {
            Some(old) => {
                let old_size = old.data.len() as u64;
                if size > old_size {
                    self.total_bytes.fetch_add(size - old_size, Ordering::Relaxed);
                } else {
                    self.total_bytes.fetch_sub(old_size - size, Ordering::Relaxed);
                }
            }
            None => {
                self.entry_count.fetch_add(1, Ordering::Relaxed);
                self.total_bytes.fetch_add(size, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        if let Some((_, old)) = self.storage.remove(key) {
            self.account_removal(&old);
            return Ok(true);
        }
        Ok(false)
    }

    fn clear(&self) -> Result<()> {
        self.storage.clear();
        self.entry_count.store(0, Ordering::Relaxed);
        self.total_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn purge(&self) -> Result<u64> {
        let mut removed = 0u64;
        let expired: Vec<String> = self
            .storage
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        for key in expired {
            if let Some((_, old)) = self.storage.remove(&key) {
                self.account_removal(&old);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    fn live_entry(data: &str) -> StoredEntry {
        StoredEntry::new(Bytes::copy_from_slice(data.as_bytes()), None)
    }

    fn expired_entry(data: &str) -> StoredEntry {
        StoredEntry::new(
            Bytes::copy_from_slice(data.as_bytes()),
            Some(Utc::now() - chrono::Duration::seconds(1)),
        )
    }

    #[test]
    fn test_roundtrip() {
        let driver = MemoryDriver::new();

        driver.put("a", live_entry("hello")).unwrap();
        let got = driver.get("a").unwrap().unwrap();
        assert_eq!(got.data.as_ref(), b"hello");

        assert!(driver.delete("a").unwrap());
        assert!(driver.get("a").unwrap().is_none());
    }

    #[test]
    fn test_expired_entries_read_as_misses() {
        let driver = MemoryDriver::new();

        driver.put("gone", expired_entry("stale")).unwrap();
        assert!(driver.get("gone").unwrap().is_none());

        // The expired entry was dropped on access
        assert_eq!(driver.stats().entry_count, 0);
    }

    #[test]
    fn test_purge_removes_only_expired() {
        let driver = MemoryDriver::new();

        driver.put("live", live_entry("keep")).unwrap();
        driver.put("dead-1", expired_entry("drop")).unwrap();
        driver.put("dead-2", expired_entry("drop")).unwrap();

        assert_eq!(driver.purge().unwrap(), 2);
        assert!(driver.get("live").unwrap().is_some());
    }

    #[test]
    fn test_byte_accounting() {
        let driver = MemoryDriver::new();

        driver.put("k", live_entry("12345")).unwrap();
        assert_eq!(driver.stats().total_bytes, 5);

        driver.put("k", live_entry("123")).unwrap();
        let stats = driver.stats();
        assert_eq!(stats.total_bytes, 3);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.writes, 2);

        driver.clear().unwrap();
        assert_eq!(driver.stats().total_bytes, 0);
    }
}
