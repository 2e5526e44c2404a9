//! Database backend implementations
//!
//! This module contains concrete implementations of the Database trait
//! for various database systems, and the registry that picks one from a
//! configuration-time backend name.

#[cfg(feature = "sqlite")]
pub mod pooled_sqlite;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub use pooled_sqlite::{PoolStats, PooledSqliteDatabase};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDatabase;

#[cfg(feature = "mysql")]
pub use mysql::MysqlDatabase;

use std::sync::Arc;

use crate::core::{Database, DatabaseError, DatabaseType, DriverConfig, Result};

/// Open an adapter by backend name with default settings
///
/// ```no_run
/// # async fn run() -> rust_active_record::Result<()> {
/// let db = rust_active_record::backends::connect("sqlite3", "app.db").await?;
/// assert!(db.is_connected());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Unknown backend names and backends whose cargo feature is disabled fail
/// with a configuration error before any connection is attempted.
pub async fn connect(backend: &str, connection_string: &str) -> Result<Arc<dyn Database>> {
    open(&DriverConfig::new(backend, connection_string)).await
}

/// Open the adapter described by `config`
///
/// # Errors
///
/// See [`connect`]. Turning autocommit off is only supported by the embedded
/// `sqlite` backend.
pub async fn open(config: &DriverConfig) -> Result<Arc<dyn Database>> {
    let db_type = config.database_type()?;

    if !config.autocommit && db_type != DatabaseType::Sqlite {
        return Err(DatabaseError::configuration(format!(
            "autocommit cannot be disabled for the {} backend",
            db_type
        )));
    }

    tracing::debug!(backend = %db_type, "opening database adapter");

    match db_type {
        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => {
            let mut db = SqliteDatabase::new().with_autocommit(config.autocommit);
            if let Some(timeout_ms) = config.timeout_ms {
                db = db.with_operation_timeout(std::time::Duration::from_millis(timeout_ms));
            }
            db.connect(&config.connection_string).await?;
            Ok(Arc::new(db))
        }
        #[cfg(feature = "sqlite")]
        DatabaseType::PooledSqlite => Ok(Arc::new(
            PooledSqliteDatabase::with_config(config.pool_config()).await?,
        )),
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => Ok(Arc::new(
            PostgresDatabase::with_config(config.pool_config()).await?,
        )),
        #[cfg(feature = "mysql")]
        DatabaseType::Mysql => Ok(Arc::new(
            MysqlDatabase::with_config(config.pool_config()).await?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(DatabaseError::configuration(format!(
            "Database '{}' requires the '{}' feature",
            other,
            other.feature()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_backend_is_configuration_error() {
        let err = connect("oracle", "whatever").await.err().unwrap();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("oracle"));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_connect_sqlite_aliases() -> Result<()> {
        for name in ["sqlite", "sqlite3", "SQLite3"] {
            let db = connect(name, ":memory:").await?;
            assert_eq!(db.database_type(), DatabaseType::Sqlite);
            assert!(db.is_connected());
        }
        Ok(())
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_pooled_sqlite() -> Result<()> {
        let mut config = DriverConfig::new("sqlite-pool", ":memory:");
        config.max_size = Some(2);
        let db = open(&config).await?;
        assert_eq!(db.database_type(), DatabaseType::PooledSqlite);
        Ok(())
    }

    #[tokio::test]
    async fn test_autocommit_off_only_for_embedded_sqlite() {
        let mut config = DriverConfig::new("sqlite-pool", ":memory:");
        config.autocommit = false;
        let err = open(&config).await.err().unwrap();
        assert!(err.is_configuration_error());
    }
}
