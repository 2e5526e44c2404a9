//! Embedded SQLite backend
//!
//! One inline connection guarded by an async mutex. Blocking rusqlite calls
//! run on tokio's blocking pool under a per-operation timeout.

use crate::core::{
    config::DEFAULT_OPERATION_TIMEOUT, database::Database, database::Statement,
    database::StatementKind, database_types::DatabaseType, error::DatabaseError, error::Result,
    value::DatabaseResult, value::DatabaseRow, value::DatabaseValue,
};
use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Convert a rusqlite Row to a DatabaseRow
pub(crate) fn row_to_database_row(row: &Row) -> rusqlite::Result<DatabaseRow> {
    let column_count = row.as_ref().column_count();
    let mut db_row = DatabaseRow::with_capacity(column_count);

    for i in 0..column_count {
        let column_name = row.as_ref().column_name(i)?.to_string();
        let value = match row.get_ref(i)? {
            ValueRef::Null => DatabaseValue::Null,
            ValueRef::Integer(v) => DatabaseValue::Integer(v),
            ValueRef::Real(v) => DatabaseValue::Float(v),
            ValueRef::Text(v) => DatabaseValue::Text(String::from_utf8_lossy(v).to_string()),
            ValueRef::Blob(v) => DatabaseValue::Blob(v.to_vec()),
        };
        db_row.insert(column_name, value);
    }

    Ok(db_row)
}

/// Convert DatabaseValue to a rusqlite parameter
pub(crate) fn value_to_param(value: &DatabaseValue) -> Value {
    match value {
        DatabaseValue::Null => Value::Null,
        DatabaseValue::Integer(v) => Value::Integer(*v),
        DatabaseValue::Float(v) => Value::Real(*v),
        DatabaseValue::Text(v) => Value::Text(v.clone()),
        DatabaseValue::Blob(v) => Value::Blob(v.clone()),
        DatabaseValue::Json(v) => Value::Text(v.to_string()),
    }
}

pub(crate) fn query_rows(
    conn: &Connection,
    sql: &str,
    params: &[DatabaseValue],
) -> rusqlite::Result<DatabaseResult> {
    let values: Vec<Value> = params.iter().map(value_to_param).collect();
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), row_to_database_row)?;

    let mut results = Vec::new();
    for row_result in rows {
        results.push(row_result?);
    }
    Ok(results)
}

pub(crate) fn execute_one(
    conn: &Connection,
    sql: &str,
    params: &[DatabaseValue],
) -> rusqlite::Result<u64> {
    let values: Vec<Value> = params.iter().map(value_to_param).collect();
    let mut stmt = conn.prepare(sql)?;
    Ok(stmt.execute(params_from_iter(values.iter()))? as u64)
}

pub(crate) fn execute_many(
    conn: &Connection,
    sql: &str,
    batch: &[Vec<DatabaseValue>],
) -> rusqlite::Result<u64> {
    let mut stmt = conn.prepare(sql)?;
    let mut affected = 0u64;
    for params in batch {
        let values: Vec<Value> = params.iter().map(value_to_param).collect();
        affected += stmt.execute(params_from_iter(values.iter()))? as u64;
    }
    Ok(affected)
}

pub(crate) fn run_statements(
    conn: &Connection,
    statements: &[Statement],
) -> rusqlite::Result<Vec<DatabaseResult>> {
    let mut results = Vec::with_capacity(statements.len());
    for statement in statements {
        match statement.kind {
            StatementKind::Query => {
                results.push(query_rows(conn, &statement.sql, &statement.params)?)
            }
            StatementKind::Execute => {
                execute_one(conn, &statement.sql, &statement.params)?;
                results.push(DatabaseResult::new());
            }
        }
    }
    Ok(results)
}

/// SQLite database implementation
pub struct SqliteDatabase {
    connection: Arc<Mutex<Option<Connection>>>,
    in_transaction: Arc<Mutex<bool>>,
    autocommit: bool,
    operation_timeout: Duration,
}

impl SqliteDatabase {
    /// Create a new, unconnected SQLite database instance
    pub fn new() -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
            in_transaction: Arc::new(Mutex::new(false)),
            autocommit: true,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Open `path` (or `:memory:`) with autocommit on
    pub async fn open(path: &str) -> Result<Self> {
        let db = Self::new();
        db.connect(path).await?;
        Ok(db)
    }

    /// With autocommit off the first write opens a transaction that stays
    /// open until [`Database::commit`] or [`Database::rollback`]
    #[must_use]
    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    /// Set the timeout applied to each operation
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// Whether a manual (autocommit off) transaction is open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
            .try_lock()
            .map(|guard| *guard)
            .unwrap_or(false)
    }

    /// Run `f` against the connection on the blocking pool
    ///
    /// `f` also receives the manual-transaction flag; both locks are held for
    /// the whole call.
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, &mut bool) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection_arc = Arc::clone(&self.connection);
        let in_transaction_arc = Arc::clone(&self.in_transaction);

        let mut task = tokio::task::spawn_blocking(move || -> Result<T> {
            let mut in_transaction = in_transaction_arc.blocking_lock();
            let mut connection = connection_arc.blocking_lock();
            let conn = connection
                .as_mut()
                .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;
            f(conn, &mut in_transaction)
        });

        // Abort the task on timeout so a stuck statement doesn't pin the handle
        tokio::select! {
            result = &mut task => {
                result.map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
            }
            _ = tokio::time::sleep(self.operation_timeout) => {
                task.abort();
                Err(DatabaseError::query_timeout(self.operation_timeout.as_millis() as u64))
            }
        }
    }
}

impl Default for SqliteDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a manual transaction before the first write when autocommit is off
fn begin_if_needed(conn: &Connection, autocommit: bool, in_transaction: &mut bool) -> Result<()> {
    if !autocommit && !*in_transaction {
        conn.execute_batch("BEGIN")?;
        *in_transaction = true;
    }
    Ok(())
}

#[async_trait]
impl Database for SqliteDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        {
            let mut connection = self.connection.lock().await;
            *connection = None;
        }
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let path = connection_string.to_string();
        let connection_arc = Arc::clone(&self.connection);

        let mut task = tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&path)?;
            conn.execute("PRAGMA foreign_keys = ON", [])?;

            let mut connection = connection_arc.blocking_lock();
            *connection = Some(conn);
            Ok(())
        });

        tokio::select! {
            result = &mut task => {
                result.map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))??
            }
            _ = tokio::time::sleep(self.operation_timeout) => {
                task.abort();
                return Err(DatabaseError::connection(format!(
                    "opening {} timed out after {}ms",
                    connection_string,
                    self.operation_timeout.as_millis()
                )));
            }
        }

        tracing::info!(path = %connection_string, autocommit = self.autocommit, "sqlite connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        {
            let mut in_transaction = self.in_transaction.lock().await;
            *in_transaction = false;
        }

        let mut connection = self.connection.lock().await;
        *connection = None;
        tracing::info!("sqlite disconnected");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        tracing::debug!(sql = %sql, params = params.len(), "sqlite query");
        let sql = sql.to_string();
        let params = params.to_vec();

        self.with_connection(move |conn, _| Ok(query_rows(conn, &sql, &params)?))
            .await
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        tracing::debug!(sql = %sql, params = params.len(), "sqlite execute");
        let sql = sql.to_string();
        let params = params.to_vec();
        let autocommit = self.autocommit;

        self.with_connection(move |conn, in_transaction| {
            begin_if_needed(conn, autocommit, in_transaction)?;
            Ok(execute_one(conn, &sql, &params)?)
        })
        .await
    }

    async fn execute_batch(&self, sql: &str, batch: &[Vec<DatabaseValue>]) -> Result<u64> {
        tracing::debug!(sql = %sql, rows = batch.len(), "sqlite execute_batch");
        let sql = sql.to_string();
        let batch = batch.to_vec();
        let autocommit = self.autocommit;

        self.with_connection(move |conn, in_transaction| {
            begin_if_needed(conn, autocommit, in_transaction)?;
            Ok(execute_many(conn, &sql, &batch)?)
        })
        .await
    }

    async fn run_in_transaction(&self, statements: Vec<Statement>) -> Result<Vec<DatabaseResult>> {
        tracing::debug!(statements = statements.len(), "sqlite transaction");
        let autocommit = self.autocommit;

        self.with_connection(move |conn, in_transaction| {
            begin_if_needed(conn, autocommit, in_transaction)?;
            // A savepoint nests inside a manual transaction and acts as a
            // plain transaction otherwise; dropping it rolls back.
            let savepoint = conn.savepoint()?;
            let results = run_statements(&savepoint, &statements)?;
            savepoint.commit()?;
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

    async fn commit(&self) -> Result<()> {
        self.with_connection(|conn, in_transaction| {
            if !*in_transaction {
                return Err(DatabaseError::transaction("Not in a transaction"));
            }
            conn.execute_batch("COMMIT")?;
            *in_transaction = false;
            Ok(())
        })
        .await
    }

    async fn rollback(&self) -> Result<()> {
        self.with_connection(|conn, in_transaction| {
            if !*in_transaction {
                return Err(DatabaseError::transaction("Not in a transaction"));
            }
            conn.execute_batch("ROLLBACK")?;
            *in_transaction = false;
            tracing::warn!("sqlite transaction rolled back");
            Ok(())
        })
        .await
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        // Best effort: Drop cannot await, so only roll back if the locks are free
        if let Ok(in_trans) = self.in_transaction.try_lock() {
            if *in_trans {
                if let Ok(connection) = self.connection.try_lock() {
                    if let Some(conn) = connection.as_ref() {
                        tracing::warn!("sqlite dropped with uncommitted writes, rolling back");
                        let _ = conn.execute_batch("ROLLBACK");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_with_table() -> Result<SqliteDatabase> {
        let db = SqliteDatabase::open(":memory:").await?;
        db.execute(
            "create table test (id integer primary key autoincrement, name text)",
            &[],
        )
        .await?;
        Ok(db)
    }

    #[test]
    fn test_sqlite_connect() {
        let db = SqliteDatabase::new();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(db.connect(":memory:").await);
            assert!(db.is_connected());
            tokio_test::assert_ok!(db.disconnect().await);
        });
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_sqlite_execute_and_query() -> Result<()> {
        let db = open_with_table().await?;

        let affected = db.execute("insert into test (name) values (?)", &["Alice".into()]).await?;
        assert_eq!(affected, 1);

        let rows = db.query("select name from test where name=?", &["Alice".into()]).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name").and_then(|v| v.as_str()), Some("Alice"));
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_execute_batch() -> Result<()> {
        let db = open_with_table().await?;
        let affected = db
            .execute_batch(
                "insert into test (name) values (?)",
                &[vec!["a".into()], vec!["b".into()], vec!["c".into()]],
            )
            .await?;
        assert_eq!(affected, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_transaction_returns_generated_key() -> Result<()> {
        let db = open_with_table().await?;
        db.execute("insert into test (name) values ('first')", &[]).await?;

        let results = db
            .run_in_transaction(vec![
                Statement::execute("insert into test (name) values (?)", vec!["second".into()]),
                db.last_inserted_key("test", "id"),
            ])
            .await?;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_empty());
        assert_eq!(results[1][0].get("id"), Some(&DatabaseValue::Integer(2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_transaction_rolls_back_on_error() -> Result<()> {
        let db = open_with_table().await?;

        let result = db
            .run_in_transaction(vec![
                Statement::execute("insert into test (name) values ('kept?')", vec![]),
                Statement::execute("insert into missing_table values (1)", vec![]),
            ])
            .await;
        assert!(result.unwrap_err().is_driver_error());

        let rows = db.query("select * from test", &[]).await?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_manual_commit_and_rollback() -> Result<()> {
        let db = SqliteDatabase::new().with_autocommit(false);
        db.connect(":memory:").await?;
        db.execute("create table test (id integer primary key, name text)", &[])
            .await?;
        assert!(db.in_transaction());
        db.commit().await?;

        db.execute("insert into test (name) values ('gone')", &[]).await?;
        db.rollback().await?;
        assert!(db.query("select * from test", &[]).await?.is_empty());

        db.execute("insert into test (name) values ('kept')", &[]).await?;
        db.commit().await?;
        assert_eq!(db.query("select * from test", &[]).await?.len(), 1);

        assert!(db.commit().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_select_columns_prepends_key() -> Result<()> {
        let db = open_with_table().await?;
        db.execute("insert into test (name) values ('x')", &[]).await?;

        let sql = format!("select {} from test", db.select_columns("id"));
        let rows = db.query(&sql, &[]).await?;
        let columns: Vec<&String> = rows[0].keys().collect();
        assert_eq!(columns, vec!["id", "name"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_error_handling_not_connected() {
        let db = SqliteDatabase::new();
        let result = db.execute("select 1", &[]).await;
        assert!(result.unwrap_err().to_string().contains("Not connected"));
    }
}
