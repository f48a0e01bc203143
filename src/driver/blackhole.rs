//! Black-Hole Driver
//!
//! Accepts every operation and retains nothing. Backs the dummy pool and
//! every unsupported-mechanism fallback, so consumers always get a usable
//! (if forgetful) cache.

use super::{Driver, StoredEntry};
use crate::error::Result;

/// The no-op storage driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackHoleDriver;

impl BlackHoleDriver {
    /// Create a new black-hole driver.
    pub fn new() -> Self {
        Self
    }
}

impl Driver for BlackHoleDriver {
    fn name(&self) -> &'static str {
        "black-hole"
    }

    fn get(&self, _key: &str) -> Result<Option<StoredEntry>> {
        Ok(None)
    }

    fn put(&self, _key: &str, _entry: StoredEntry) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_retains_nothing() {
        let driver = BlackHoleDriver::new();

        driver
            .put("key", StoredEntry::new(Bytes::from("value"), None))
            .unwrap();

        assert!(driver.get("key").unwrap().is_none());
        assert!(!driver.delete("key").unwrap());
        assert_eq!(driver.purge().unwrap(), 0);
    }
}
