//! Pooled SQLite database backend implementation
//!
//! Connection-pooled SQLite adapter built on deadpool. Every call checks a
//! connection out of the pool for its duration, so `run_in_transaction` keeps
//! its statements (and `last_insert_rowid()`) on one connection.

use crate::core::{
    config::PoolConfig, database::Database, database::Statement, database_types::DatabaseType,
    error::DatabaseError, error::Result, value::DatabaseResult, value::DatabaseValue,
};
use async_trait::async_trait;
use deadpool_sqlite::{Config, Pool, Runtime};
use std::time::Duration;

use super::sqlite::{execute_many, execute_one, query_rows, run_statements};

/// Pooled SQLite database implementation
///
/// For an in-memory database shared by the whole pool use a shared-cache URI
/// such as `file:app?mode=memory&cache=shared`; a bare `:memory:` gives every
/// pooled connection its own empty database.
///
/// # Example
///
/// ```no_run
/// use rust_active_record::backends::PooledSqliteDatabase;
/// use rust_active_record::core::Database;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = PooledSqliteDatabase::new("app.db").await?;
///     db.execute("create table users (id integer primary key, name text)", &[])
///         .await?;
///     Ok(())
/// }
/// ```
pub struct PooledSqliteDatabase {
    pool: Pool,
    operation_timeout: Duration,
}

impl PooledSqliteDatabase {
    /// Create a pool with the default configuration
    ///
    /// # Errors
    ///
    /// Returns error if pool creation or initialization fails
    pub async fn new(connection_string: impl Into<String>) -> Result<Self> {
        Self::with_config(PoolConfig::new(connection_string)).await
    }

    /// Create a pool with a custom configuration
    ///
    /// # Errors
    ///
    /// Returns error if pool creation or initialization fails
    pub async fn with_config(config: PoolConfig) -> Result<Self> {
        let mut pool_config = deadpool_sqlite::PoolConfig::new(config.max_size);
        pool_config.timeouts.wait = Some(config.timeout);

        let mut sqlite_config = Config::new(config.connection_string.clone());
        sqlite_config.pool = Some(pool_config);

        let pool = sqlite_config
            .create_pool(Runtime::Tokio1)
            .map_err(|e| DatabaseError::connection(format!("Failed to create pool: {}", e)))?;

        let db = Self {
            pool,
            operation_timeout: config.operation_timeout,
        };

        db.interact(|conn| {
            conn.execute("PRAGMA foreign_keys = ON", [])?;
            Ok(())
        })
        .await?;

        tracing::info!(
            path = %config.connection_string,
            max_size = config.max_size,
            "sqlite pool ready"
        );
        Ok(db)
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let status = self.pool.status();
        PoolStats {
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Run `f` on a pooled connection under the operation timeout
    async fn interact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            tracing::warn!(error = %e, "sqlite pool checkout failed");
            DatabaseError::connection(format!("Failed to acquire connection: {}", e))
        })?;

        tokio::time::timeout(self.operation_timeout, conn.interact(f))
            .await
            .map_err(|_| DatabaseError::query_timeout(self.operation_timeout.as_millis() as u64))?
            .map_err(|e| DatabaseError::other(format!("Interact error: {}", e)))?
            .map_err(DatabaseError::from)
    }
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total number of connections in the pool
    pub size: usize,
    /// Number of available connections
    pub available: usize,
    /// Number of requests waiting for a connection
    pub waiting: usize,
}

#[async_trait]
impl Database for PooledSqliteDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PooledSqlite
    }

    async fn connect(&self, _connection_string: &str) -> Result<()> {
        // The pool is opened by the constructor; this only checks health
        if self.pool.is_closed() {
            return Err(DatabaseError::connection("Pool has been closed"));
        }
        let _ = self.pool.get().await.map_err(|e| {
            DatabaseError::connection(format!("Pool health check failed: {}", e))
        })?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn disconnect(&self) -> Result<()> {
        self.pool.close();
        tracing::info!("sqlite pool closed");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        tracing::debug!(sql = %sql, params = params.len(), "pooled sqlite query");
        let sql = sql.to_string();
        let params = params.to_vec();
        self.interact(move |conn| query_rows(conn, &sql, &params)).await
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        tracing::debug!(sql = %sql, params = params.len(), "pooled sqlite execute");
        let sql = sql.to_string();
        let params = params.to_vec();
        self.interact(move |conn| execute_one(conn, &sql, &params)).await
    }

    async fn execute_batch(&self, sql: &str, batch: &[Vec<DatabaseValue>]) -> Result<u64> {
        tracing::debug!(sql = %sql, rows = batch.len(), "pooled sqlite execute_batch");
        let sql = sql.to_string();
        let batch = batch.to_vec();
        self.interact(move |conn| execute_many(conn, &sql, &batch)).await
    }

    async fn run_in_transaction(&self, statements: Vec<Statement>) -> Result<Vec<DatabaseResult>> {
        tracing::debug!(statements = statements.len(), "pooled sqlite transaction");
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            let results = run_statements(&tx, &statements)?;
            tx.commit()?;
            Ok(results)
        })
        .await
    }

    fn last_inserted_key(&self, _table: &str, _primary_key: &str) -> Statement {
        Statement::query("select last_insert_rowid() as id", Vec::new())
    }

    fn select_columns(&self, primary_key: &str) -> String {
        format!("{}, *", primary_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pooled_sqlite_connect() {
        let db = PooledSqliteDatabase::new(":memory:").await;
        assert!(db.is_ok());
        let db = db.unwrap();
        assert!(db.is_connected());
        assert!(db.connect("ignored").await.is_ok());
    }

    #[tokio::test]
    async fn test_pooled_sqlite_execute_and_query() -> Result<()> {
        let db = PooledSqliteDatabase::with_config(
            PoolConfig::new("file:pooled_exec?mode=memory&cache=shared").with_max_size(2),
        )
        .await?;

        db.execute(
            "create table users (id integer primary key, name text)",
            &[],
        )
        .await?;
        db.execute("insert into users (name) values (?)", &["Alice".into()])
            .await?;

        let rows = db.query("select * from users", &[]).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&DatabaseValue::from("Alice")));
        Ok(())
    }

    #[tokio::test]
    async fn test_pooled_transaction_keeps_one_connection() -> Result<()> {
        let db = PooledSqliteDatabase::new("file:pooled_tx?mode=memory&cache=shared").await?;
        db.execute(
            "create table users (id integer primary key autoincrement, name text)",
            &[],
        )
        .await?;
        db.execute_batch(
            "insert into users (name) values (?)",
            &[vec!["a".into()], vec!["b".into()]],
        )
        .await?;

        let results = db
            .run_in_transaction(vec![
                Statement::execute("insert into users (name) values (?)", vec!["c".into()]),
                db.last_inserted_key("users", "id"),
            ])
            .await?;
        assert_eq!(results[1][0].get("id"), Some(&DatabaseValue::Integer(3)));
        Ok(())
    }

    #[tokio::test]
    async fn test_pooled_concurrent_queries() -> Result<()> {
        let db = Arc::new(
            PooledSqliteDatabase::new("file:pooled_concurrent?mode=memory&cache=shared").await?,
        );
        db.execute("create table t (id integer primary key, v int)", &[])
            .await?;
        db.execute("insert into t (v) values (?)", &[7.into()]).await?;

        let mut handles = vec![];
        for _ in 0..5 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                db.query("select v from t", &[]).await
            }));
        }

        for handle in handles {
            let rows = handle
                .await
                .map_err(|e| DatabaseError::other(e.to_string()))??;
            assert_eq!(rows[0].get("v"), Some(&DatabaseValue::Integer(7)));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_pool_stats_and_close() -> Result<()> {
        let db = PooledSqliteDatabase::new(":memory:").await?;
        let stats = db.stats();
        assert!(stats.size > 0);

        db.disconnect().await?;
        assert!(!db.is_connected());
        assert!(db.query("select 1", &[]).await.is_err());
        Ok(())
    }
}
