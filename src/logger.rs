//! Pool Logging Capability
//!
//! Pools carry an optional structured logger with a message-plus-context
//! shape. The registry binds one when the host supplies it; absence is
//! never an error.

use std::sync::Arc;

use serde_json::Value;

/// Structured context attached to every log call
pub type LogContext = serde_json::Map<String, Value>;

/// The logging capability a pool can be bound to.
///
/// Implementations must be cheap to call; pools log on the hot path
/// (driver failures, expired reads).
pub trait PoolLogger: Send + Sync {
    /// Record a message with structured context
    fn log(&self, message: &str, context: &LogContext);
}

/// Shared logger handle
pub type SharedLogger = Arc<dyn PoolLogger>;

// =============================================================================
// Tracing Logger
// =============================================================================

/// Logger that forwards to the tracing system.
///
/// Useful as a default host logger for development and audit trails.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    /// Whether to log at info level (true) or debug level (false)
    info_level: bool,
}

impl TracingLogger {
    /// Create a new tracing logger (debug level).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a logger that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

impl PoolLogger for TracingLogger {
    fn log(&self, message: &str, context: &LogContext) {
        let json = serde_json::to_string(context).unwrap_or_else(|_| format!("{:?}", context));

        if self.info_level {
            tracing::info!(context = %json, "{message}");
        } else {
            tracing::debug!(context = %json, "{message}");
        }
    }
}

// =============================================================================
// Memory Logger
// =============================================================================

/// A single recorded log call
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// The logged message
    pub message: String,
    /// The structured context
    pub context: LogContext,
}

/// In-memory recording logger for tests and embedders.
///
/// Collects log calls for later inspection.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: parking_lot::RwLock<Vec<LogRecord>>,
}

impl MemoryLogger {
    /// Create a new in-memory logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded log calls.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().clone()
    }

    /// Get the count of recorded log calls.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Clear all recorded log calls.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Get records whose message contains the given fragment.
    pub fn records_containing(&self, fragment: &str) -> Vec<LogRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.message.contains(fragment))
            .cloned()
            .collect()
    }
}

impl PoolLogger for MemoryLogger {
    fn log(&self, message: &str, context: &LogContext) {
        self.records.write().push(LogRecord {
            message: message.to_string(),
            context: context.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(key: &str, value: &str) -> LogContext {
        let mut context = LogContext::new();
        context.insert(key.into(), Value::String(value.into()));
        context
    }

    #[test]
    fn test_tracing_logger_does_not_panic() {
        let logger = TracingLogger::info_level();
        logger.log("driver failure", &context_with("key", "object-1"));
    }

    #[test]
    fn test_memory_logger_records() {
        let logger = MemoryLogger::new();
        assert!(logger.is_empty());

        logger.log("read failed", &context_with("key", "a"));
        logger.log("write failed", &context_with("key", "b"));

        assert_eq!(logger.len(), 2);
        assert_eq!(logger.records_containing("read").len(), 1);

        logger.clear();
        assert!(logger.is_empty());
    }
}
