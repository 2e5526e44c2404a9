//! MySQL / MariaDB database backend implementation
//!
//! Pooled adapter on mysql_async. MySQL already uses `?` placeholders, so SQL
//! is passed through unchanged and executed as prepared statements.

use crate::core::{
    config::PoolConfig, config::DEFAULT_OPERATION_TIMEOUT, database::Database,
    database::Statement, database::StatementKind, database_types::DatabaseType,
    error::DatabaseError, error::Result, value::DatabaseResult, value::DatabaseRow,
    value::DatabaseValue,
};
use async_trait::async_trait;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, TxOpts, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

/// Character set id MySQL reports for binary strings
const BINARY_CHARSET: u16 = 63;

/// Convert a mysql_async Row to a DatabaseRow
fn row_to_database_row(row: &mysql_async::Row) -> Result<DatabaseRow> {
    let columns = row.columns_ref();
    let mut db_row = DatabaseRow::with_capacity(columns.len());

    for (idx, column) in columns.iter().enumerate() {
        let value = match row.as_ref(idx) {
            None | Some(Value::NULL) => DatabaseValue::Null,
            Some(Value::Int(v)) => DatabaseValue::Integer(*v),
            Some(Value::UInt(v)) => match i64::try_from(*v) {
                Ok(v) => DatabaseValue::Integer(v),
                Err(_) => DatabaseValue::Float(*v as f64),
            },
            Some(Value::Float(v)) => DatabaseValue::Float(*v as f64),
            Some(Value::Double(v)) => DatabaseValue::Float(*v),
            Some(Value::Bytes(bytes)) => {
                if column.column_type() == ColumnType::MYSQL_TYPE_JSON {
                    DatabaseValue::Json(serde_json::from_slice(bytes)?)
                } else if column.character_set() == BINARY_CHARSET {
                    DatabaseValue::Blob(bytes.clone())
                } else {
                    DatabaseValue::Text(String::from_utf8_lossy(bytes).to_string())
                }
            }
            Some(Value::Date(y, mo, d, h, mi, s, us)) => DatabaseValue::Text(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                y, mo, d, h, mi, s, us
            )),
            Some(Value::Time(neg, days, h, mi, s, us)) => DatabaseValue::Text(format!(
                "{}{}:{:02}:{:02}.{:06}",
                if *neg { "-" } else { "" },
                *days * 24 + u32::from(*h),
                mi,
                s,
                us
            )),
        };
        db_row.insert(column.name_str().to_string(), value);
    }

    Ok(db_row)
}

/// Convert DatabaseValue to a mysql_async value
fn value_to_param(value: &DatabaseValue) -> Value {
    match value {
        DatabaseValue::Null => Value::NULL,
        DatabaseValue::Integer(v) => Value::Int(*v),
        DatabaseValue::Float(v) => Value::Double(*v),
        DatabaseValue::Text(v) => Value::Bytes(v.clone().into_bytes()),
        DatabaseValue::Blob(v) => Value::Bytes(v.clone()),
        DatabaseValue::Json(v) => Value::Bytes(v.to_string().into_bytes()),
    }
}

fn to_params(params: &[DatabaseValue]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(value_to_param).collect())
    }
}

async fn query_rows<Q: Queryable>(
    conn: &mut Q,
    sql: &str,
    params: &[DatabaseValue],
) -> Result<DatabaseResult> {
    let rows: Vec<mysql_async::Row> = conn.exec(sql, to_params(params)).await?;
    rows.iter().map(row_to_database_row).collect()
}

async fn execute_one<Q: Queryable>(
    conn: &mut Q,
    sql: &str,
    params: &[DatabaseValue],
) -> Result<u64> {
    let result = conn.exec_iter(sql, to_params(params)).await?;
    let affected = result.affected_rows();
    result.drop_result().await?;
    Ok(affected)
}

/// MySQL database implementation
pub struct MysqlDatabase {
    pool: Mutex<Option<Pool>>,
    max_size: usize,
    operation_timeout: Duration,
}

impl MysqlDatabase {
    /// Create a new, unconnected MySQL database instance
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(None),
            max_size: PoolConfig::default().max_size,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Create an instance and connect it with `config`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the server is unreachable
    pub async fn with_config(config: PoolConfig) -> Result<Self> {
        let db = Self {
            pool: Mutex::new(None),
            max_size: config.max_size,
            operation_timeout: config.operation_timeout,
        };
        db.connect(&config.connection_string).await?;
        Ok(db)
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| DatabaseError::query_timeout(self.operation_timeout.as_millis() as u64))?
    }

    async fn conn(&self) -> Result<Conn> {
        let pool = self
            .pool
            .lock()
            .await
            .clone()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        pool.get_conn().await.map_err(|e| {
            tracing::warn!(error = %e, "mysql pool checkout failed");
            DatabaseError::connection(format!("Failed to acquire connection: {}", e))
        })
    }
}

impl Default for MysqlDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MysqlDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        let opts = Opts::from_url(connection_string)
            .map_err(|e| DatabaseError::configuration(format!("Invalid connection URL: {}", e)))?;
        let constraints = PoolConstraints::new(1, self.max_size.max(1)).ok_or_else(|| {
            DatabaseError::configuration(format!("invalid pool size {}", self.max_size))
        })?;
        let opts = OptsBuilder::from_opts(opts)
            .pool_opts(PoolOpts::default().with_constraints(constraints));
        let pool = Pool::new(opts);

        // Check a connection out once so a bad host fails here
        self.timed(async {
            pool.get_conn()
                .await
                .map(drop)
                .map_err(|e| DatabaseError::connection(e.to_string()))
        })
        .await?;

        let previous = self.pool.lock().await.replace(pool);
        if let Some(previous) = previous {
            previous.disconnect().await?;
        }

        tracing::info!(max_size = self.max_size, "mysql connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool
            .try_lock()
            .map(|pool| pool.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.disconnect().await?;
        }
        tracing::info!("mysql disconnected");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        tracing::debug!(sql = %sql, params = params.len(), "mysql query");
        let mut conn = self.conn().await?;
        self.timed(query_rows(&mut conn, sql, params)).await
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        tracing::debug!(sql = %sql, params = params.len(), "mysql execute");
        let mut conn = self.conn().await?;
        self.timed(execute_one(&mut conn, sql, params)).await
    }

    async fn execute_batch(&self, sql: &str, batch: &[Vec<DatabaseValue>]) -> Result<u64> {
        tracing::debug!(sql = %sql, rows = batch.len(), "mysql execute_batch");
        let mut conn = self.conn().await?;

        self.timed(async {
            let mut affected = 0u64;
            for params in batch {
                affected += execute_one(&mut conn, sql, params).await?;
            }
            Ok(affected)
        })
        .await
    }

    async fn run_in_transaction(&self, statements: Vec<Statement>) -> Result<Vec<DatabaseResult>> {
        tracing::debug!(statements = statements.len(), "mysql transaction");
        let mut conn = self.conn().await?;

        self.timed(async {
            // Dropping an uncommitted transaction rolls it back
            let mut tx = conn.start_transaction(TxOpts::default()).await?;
            let mut results = Vec::with_capacity(statements.len());
            for statement in &statements {
                match statement.kind {
                    StatementKind::Query => {
                        results.push(query_rows(&mut tx, &statement.sql, &statement.params).await?)
                    }
                    StatementKind::Execute => {
                        execute_one(&mut tx, &statement.sql, &statement.params).await?;
                        results.push(DatabaseResult::new());
                    }
                }
            }
            tx.commit().await?;
            Ok(results)
        })
        .await
    }

    fn last_inserted_key(&self, _table: &str, _primary_key: &str) -> Statement {
        Statement::query("select last_insert_id() as id", Vec::new())
    }

    fn empty_insert(&self, table: &str) -> Statement {
        Statement::execute(format!("insert into {} () values ()", table), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_mysql_url() -> Option<String> {
        std::env::var("MYSQL_URL").ok()
    }

    #[test]
    fn test_params_conversion() {
        assert!(matches!(to_params(&[]), Params::Empty));
        match to_params(&[1.into(), "a".into(), DatabaseValue::Null]) {
            Params::Positional(values) => {
                assert_eq!(values[0], Value::Int(1));
                assert_eq!(values[1], Value::Bytes(b"a".to_vec()));
                assert_eq!(values[2], Value::NULL);
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_empty_insert_uses_empty_column_list() {
        let statement = MysqlDatabase::new().empty_insert("asd");
        assert_eq!(statement.sql, "insert into asd () values ()");
        assert!(statement.params.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let db = MysqlDatabase::new();
        let err = db.connect("not a url").await.unwrap_err();
        assert!(err.is_configuration_error());
        assert!(!db.is_connected());
    }

    #[tokio::test]
    #[ignore] // Run with: MYSQL_URL=... cargo test --features mysql -- --ignored
    async fn test_mysql_insert_and_read_back_key() -> Result<()> {
        let url = match get_mysql_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: MYSQL_URL not set");
                return Ok(());
            }
        };

        let db = MysqlDatabase::new();
        db.connect(&url).await?;
        db.execute("drop table if exists ar_my_keys", &[]).await?;
        db.execute(
            "create table ar_my_keys (id int auto_increment primary key, age int, name text)",
            &[],
        )
        .await?;

        let results = db
            .run_in_transaction(vec![
                Statement::execute(
                    "insert into ar_my_keys (age, name) values (?, ?)",
                    vec![10.into(), "foo".into()],
                ),
                db.last_inserted_key("ar_my_keys", "id"),
            ])
            .await?;
        assert_eq!(results[1][0].get("id"), Some(&DatabaseValue::Integer(1)));

        let affected = db
            .execute("update ar_my_keys set age=? where name=?", &[20.into(), "foo".into()])
            .await?;
        assert_eq!(affected, 1);

        db.execute("drop table ar_my_keys", &[]).await?;
        db.disconnect().await?;
        Ok(())
    }
}
