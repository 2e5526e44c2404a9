//! Driver configuration
//!
//! [`PoolConfig`] tunes the pooled adapters; [`DriverConfig`] is the
//! serializable form used to pick and open a backend by name.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::database::Database;
use super::database_types::DatabaseType;
use super::error::Result;

/// Default timeout for database operations (30 seconds)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool configuration for pooled backends
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Timeout for acquiring a connection from the pool
    pub timeout: Duration,
    /// Timeout for database operations (query, execute, etc.)
    pub operation_timeout: Duration,
    /// Backend connection string
    pub connection_string: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            timeout: Duration::from_secs(5),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            connection_string: String::new(),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Set maximum pool size
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set connection acquisition timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set database operation timeout (for query, execute, etc.)
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

fn default_autocommit() -> bool {
    true
}

/// Backend selection as it appears in a configuration file
///
/// ```
/// use rust_active_record::core::DriverConfig;
///
/// let config: DriverConfig = serde_json::from_str(
///     r#"{ "backend": "sqlite3", "connection_string": ":memory:" }"#,
/// ).unwrap();
/// assert!(config.autocommit);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Backend identifier, e.g. `sqlite3`, `postgres`, `mysql`
    pub backend: String,
    /// Opaque connection string forwarded to the client library
    pub connection_string: String,
    /// Pool size for pooled backends
    #[serde(default)]
    pub max_size: Option<usize>,
    /// Operation timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Commit every write immediately (embedded SQLite only)
    #[serde(default = "default_autocommit")]
    pub autocommit: bool,
}

impl DriverConfig {
    /// Create a configuration with default pool settings
    pub fn new(backend: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            connection_string: connection_string.into(),
            max_size: None,
            timeout_ms: None,
            autocommit: true,
        }
    }

    /// Resolve the backend identifier
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown identifiers and for backends
    /// whose cargo feature is not enabled.
    pub fn database_type(&self) -> Result<DatabaseType> {
        let db_type: DatabaseType = self.backend.parse()?;
        if !db_type.is_available() {
            return Err(super::error::DatabaseError::configuration(format!(
                "Database '{}' requires the '{}' feature",
                self.backend,
                db_type.feature()
            )));
        }
        Ok(db_type)
    }

    /// Pool settings derived from this configuration
    pub fn pool_config(&self) -> PoolConfig {
        let mut config = PoolConfig::new(self.connection_string.clone());
        if let Some(max_size) = self.max_size {
            config = config.with_max_size(max_size);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config = config.with_operation_timeout(Duration::from_millis(timeout_ms));
        }
        config
    }

    /// Open the adapter this configuration describes
    ///
    /// # Errors
    ///
    /// Configuration errors for unknown or disabled backends, driver errors
    /// when the connection cannot be established.
    pub async fn open(&self) -> Result<Arc<dyn Database>> {
        crate::backends::open(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new("test.db")
            .with_max_size(4)
            .with_operation_timeout(Duration::from_secs(2));
        assert_eq!(config.max_size, 4);
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
        assert_eq!(config.connection_string, "test.db");
    }

    #[test]
    fn test_driver_config_deserialize() {
        let config: DriverConfig = serde_json::from_str(
            r#"{ "backend": "sqlite-pool", "connection_string": "app.db", "max_size": 4, "timeout_ms": 500 }"#,
        )
        .unwrap();

        let pool = config.pool_config();
        assert_eq!(pool.max_size, 4);
        assert_eq!(pool.operation_timeout, Duration::from_millis(500));
        assert!(config.autocommit);
    }

    #[test]
    fn test_driver_config_unknown_backend() {
        let config = DriverConfig::new("oracle", "");
        let err = config.database_type().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_driver_config_disabled_backend() {
        let config = DriverConfig::new("mysql", "mysql://localhost/db");
        let err = config.database_type().unwrap_err();
        assert!(err.to_string().contains("'mysql' feature"));
    }
}
