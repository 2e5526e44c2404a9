//! PostgreSQL database backend implementation
//!
//! Pooled PostgreSQL adapter on deadpool-postgres. SQL arrives with `?`
//! placeholders and is rewritten to `$n` before preparing; arguments are then
//! bound according to the parameter types the server reports.

use crate::core::{
    config::PoolConfig, config::DEFAULT_OPERATION_TIMEOUT, database::Database,
    database::Statement, database::StatementKind, database_types::DatabaseType,
    error::DatabaseError, error::Result, query_builder::numbered_placeholders,
    value::DatabaseResult, value::DatabaseRow, value::DatabaseValue,
};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{GenericClient, NoTls, Row};

type Param = Box<dyn ToSql + Sync + Send>;

/// Convert a tokio_postgres Row to a DatabaseRow
fn row_to_database_row(row: &Row) -> Result<DatabaseRow> {
    let mut db_row = DatabaseRow::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let column_name = column.name().to_string();
        let value = match column.type_().name() {
            "bool" => row
                .try_get::<_, Option<bool>>(idx)?
                .map(|b| DatabaseValue::Integer(b as i64)),
            "int2" => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| DatabaseValue::Integer(v as i64)),
            "int4" => row
                .try_get::<_, Option<i32>>(idx)?
                .map(|v| DatabaseValue::Integer(v as i64)),
            "int8" => row.try_get::<_, Option<i64>>(idx)?.map(DatabaseValue::Integer),
            "float4" => row
                .try_get::<_, Option<f32>>(idx)?
                .map(|v| DatabaseValue::Float(v as f64)),
            "float8" => row.try_get::<_, Option<f64>>(idx)?.map(DatabaseValue::Float),
            "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(DatabaseValue::Blob),
            "json" | "jsonb" => row
                .try_get::<_, Option<serde_json::Value>>(idx)?
                .map(DatabaseValue::Json),
            // Anything else with a text representation
            _ => row.try_get::<_, Option<String>>(idx)?.map(DatabaseValue::Text),
        };
        db_row.insert(column_name, value.unwrap_or(DatabaseValue::Null));
    }

    Ok(db_row)
}

fn mismatch(ty: &Type, value: &DatabaseValue) -> DatabaseError {
    DatabaseError::query(format!(
        "cannot bind {} value to a {} parameter",
        value.type_name(),
        ty
    ))
}

/// Convert DatabaseValue to a parameter of the type the statement expects
fn value_to_param(ty: &Type, value: &DatabaseValue) -> Result<Param> {
    let null = value.is_null();
    let param: Param = match ty.name() {
        "bool" => Box::new(if null {
            None
        } else {
            Some(value.as_bool().ok_or_else(|| mismatch(ty, value))?)
        }),
        "int2" => Box::new(if null {
            None
        } else {
            let v = value.as_int().ok_or_else(|| mismatch(ty, value))?;
            Some(i16::try_from(v).map_err(|_| mismatch(ty, value))?)
        }),
        "int4" => Box::new(if null {
            None
        } else {
            let v = value.as_int().ok_or_else(|| mismatch(ty, value))?;
            Some(i32::try_from(v).map_err(|_| mismatch(ty, value))?)
        }),
        "int8" => Box::new(if null {
            None
        } else {
            Some(value.as_int().ok_or_else(|| mismatch(ty, value))?)
        }),
        "float4" => Box::new(if null {
            None
        } else {
            Some(value.as_float().ok_or_else(|| mismatch(ty, value))? as f32)
        }),
        "float8" => Box::new(if null {
            None
        } else {
            Some(value.as_float().ok_or_else(|| mismatch(ty, value))?)
        }),
        "bytea" => Box::new(if null {
            None
        } else {
            Some(
                value
                    .as_bytes()
                    .ok_or_else(|| mismatch(ty, value))?
                    .to_vec(),
            )
        }),
        "json" | "jsonb" => Box::new(match value {
            DatabaseValue::Null => None,
            DatabaseValue::Json(v) => Some(v.clone()),
            DatabaseValue::Text(s) => Some(serde_json::from_str::<serde_json::Value>(s)?),
            other => return Err(mismatch(ty, other)),
        }),
        "text" | "varchar" | "bpchar" | "name" | "unknown" => Box::new(if null {
            None
        } else {
            Some(value.as_string())
        }),
        _ => {
            return Err(DatabaseError::query(format!(
                "unsupported parameter type {}",
                ty
            )))
        }
    };
    Ok(param)
}

async fn prepare_and_bind<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[DatabaseValue],
) -> Result<(tokio_postgres::Statement, Vec<Param>)> {
    let statement = client.prepare(&numbered_placeholders(sql)).await?;
    if statement.params().len() != params.len() {
        return Err(DatabaseError::query(format!(
            "statement expects {} arguments, got {}",
            statement.params().len(),
            params.len()
        )));
    }
    let bound = statement
        .params()
        .iter()
        .zip(params)
        .map(|(ty, value)| value_to_param(ty, value))
        .collect::<Result<Vec<_>>>()?;
    Ok((statement, bound))
}

fn as_refs(bound: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    bound
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

async fn query_rows<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[DatabaseValue],
) -> Result<DatabaseResult> {
    let (statement, bound) = prepare_and_bind(client, sql, params).await?;
    let rows = client.query(&statement, &as_refs(&bound)).await?;
    rows.iter().map(row_to_database_row).collect()
}

async fn execute_one<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[DatabaseValue],
) -> Result<u64> {
    let (statement, bound) = prepare_and_bind(client, sql, params).await?;
    Ok(client.execute(&statement, &as_refs(&bound)).await?)
}

/// PostgreSQL database implementation
pub struct PostgresDatabase {
    pool: Mutex<Option<Pool>>,
    max_size: usize,
    operation_timeout: Duration,
}

impl PostgresDatabase {
    /// Create a new, unconnected PostgreSQL database instance
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
    /// Returns error if the connection string is invalid or the server is
    /// unreachable
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

    async fn client(&self) -> Result<Object> {
        let pool = self
            .pool
            .lock()
            .await
            .clone()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        pool.get().await.map_err(|e| {
            tracing::warn!(error = %e, "postgres pool checkout failed");
            DatabaseError::connection(format!("Failed to acquire connection: {}", e))
        })
    }
}

impl Default for PostgresDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        let pg_config = connection_string
            .parse::<tokio_postgres::Config>()
            .map_err(|e| {
                DatabaseError::configuration(format!("Invalid connection string: {}", e))
            })?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(self.max_size)
            .build()
            .map_err(|e| DatabaseError::connection(format!("Failed to create pool: {}", e)))?;

        // Check a connection out once so a bad host fails here
        self.timed(async {
            pool.get()
                .await
                .map(drop)
                .map_err(|e| DatabaseError::connection(e.to_string()))
        })
        .await?;

        let previous = self.pool.lock().await.replace(pool);
        if let Some(previous) = previous {
            previous.close();
        }

        tracing::info!(max_size = self.max_size, "postgres connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool
            .try_lock()
            .map(|pool| pool.as_ref().is_some_and(|p| !p.is_closed()))
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close();
        }
        tracing::info!("postgres disconnected");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        tracing::debug!(sql = %sql, params = params.len(), "postgres query");
        let client = self.client().await?;
        let client: &tokio_postgres::Client = &client;
        self.timed(query_rows(client, sql, params)).await
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        tracing::debug!(sql = %sql, params = params.len(), "postgres execute");
        let client = self.client().await?;
        let client: &tokio_postgres::Client = &client;
        self.timed(execute_one(client, sql, params)).await
    }

    async fn execute_batch(&self, sql: &str, batch: &[Vec<DatabaseValue>]) -> Result<u64> {
        tracing::debug!(sql = %sql, rows = batch.len(), "postgres execute_batch");
        let client = self.client().await?;
        let client: &tokio_postgres::Client = &client;

        self.timed(async {
            let statement = client.prepare(&numbered_placeholders(sql)).await?;
            let mut affected = 0u64;
            for params in batch {
                let bound = statement
                    .params()
                    .iter()
                    .zip(params)
                    .map(|(ty, value)| value_to_param(ty, value))
                    .collect::<Result<Vec<_>>>()?;
                affected += client.execute(&statement, &as_refs(&bound)).await?;
            }
            Ok(affected)
        })
        .await
    }

    async fn run_in_transaction(&self, statements: Vec<Statement>) -> Result<Vec<DatabaseResult>> {
        tracing::debug!(statements = statements.len(), "postgres transaction");
        let mut client = self.client().await?;
        let client: &mut tokio_postgres::Client = &mut client;

        self.timed(async {
            // Dropping an uncommitted transaction rolls it back
            let tx = client.transaction().await?;
            let mut results = Vec::with_capacity(statements.len());
            for statement in &statements {
                match statement.kind {
                    StatementKind::Query => {
                        results.push(query_rows(&tx, &statement.sql, &statement.params).await?)
                    }
                    StatementKind::Execute => {
                        execute_one(&tx, &statement.sql, &statement.params).await?;
                        results.push(DatabaseResult::new());
                    }
                }
            }
            tx.commit().await?;
            Ok(results)
        })
        .await
    }

    fn last_inserted_key(&self, table: &str, primary_key: &str) -> Statement {
        Statement::query(
            format!(
                "select currval(pg_get_serial_sequence('{}', '{}')) as id",
                table, primary_key
            ),
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_postgres_url() -> Option<String> {
        std::env::var("POSTGRES_URL").ok()
    }

    #[test]
    fn test_value_to_param_checks_types() {
        assert!(value_to_param(&Type::INT4, &DatabaseValue::Integer(5)).is_ok());
        assert!(value_to_param(&Type::INT4, &DatabaseValue::Null).is_ok());
        assert!(value_to_param(&Type::INT4, &DatabaseValue::Integer(i64::MAX)).is_err());
        assert!(value_to_param(&Type::INT8, &"not a number".into()).is_err());
        assert!(value_to_param(&Type::TEXT, &DatabaseValue::Integer(5)).is_ok());
        assert!(value_to_param(&Type::JSONB, &"{\"a\":1}".into()).is_ok());
        assert!(value_to_param(&Type::BYTEA, &DatabaseValue::Integer(1)).is_err());
    }

    #[test]
    fn test_last_inserted_key_uses_serial_sequence() {
        let db = PostgresDatabase::new();
        let statement = db.last_inserted_key("users", "id");
        assert_eq!(statement.kind, StatementKind::Query);
        assert!(statement.sql.contains("pg_get_serial_sequence('users', 'id')"));
        assert_eq!(db.select_columns("id"), "*");
    }

    #[tokio::test]
    async fn test_not_connected() {
        let db = PostgresDatabase::new();
        assert!(!db.is_connected());
        let err = db.query("select 1", &[]).await.unwrap_err();
        assert!(err.to_string().contains("Not connected"));
    }

    #[tokio::test]
    #[ignore] // Run with: POSTGRES_URL=... cargo test --features postgres -- --ignored
    async fn test_postgres_connect() {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return;
            }
        };

        let db = PostgresDatabase::new();
        assert!(db.connect(&url).await.is_ok());
        assert!(db.is_connected());
        assert!(db.disconnect().await.is_ok());
        assert!(!db.is_connected());
    }

    #[tokio::test]
    #[ignore] // Run with: POSTGRES_URL=... cargo test --features postgres -- --ignored
    async fn test_postgres_insert_and_read_back_key() -> Result<()> {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return Ok(());
            }
        };

        let db = PostgresDatabase::new();
        db.connect(&url).await?;

        db.execute("drop table if exists ar_pg_keys", &[]).await?;
        db.execute(
            "create table ar_pg_keys (id serial primary key, age int, name text)",
            &[],
        )
        .await?;

        let results = db
            .run_in_transaction(vec![
                Statement::execute(
                    "insert into ar_pg_keys (age, name) values (?, ?)",
                    vec![10.into(), "foo".into()],
                ),
                db.last_inserted_key("ar_pg_keys", "id"),
            ])
            .await?;
        assert_eq!(results[1][0].get("id"), Some(&DatabaseValue::Integer(1)));

        let rows = db
            .query("select age from ar_pg_keys where name=?", &["foo".into()])
            .await?;
        assert_eq!(rows[0].get("age"), Some(&DatabaseValue::Integer(10)));

        db.execute("drop table ar_pg_keys", &[]).await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore] // Run with: POSTGRES_URL=... cargo test --features postgres -- --ignored
    async fn test_postgres_transaction_rollback() -> Result<()> {
        let url = match get_postgres_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: POSTGRES_URL not set");
                return Ok(());
            }
        };

        let db = PostgresDatabase::new();
        db.connect(&url).await?;
        db.execute("drop table if exists ar_pg_tx", &[]).await?;
        db.execute("create table ar_pg_tx (id serial primary key, name text)", &[])
            .await?;

        let result = db
            .run_in_transaction(vec![
                Statement::execute("insert into ar_pg_tx (name) values (?)", vec!["a".into()]),
                Statement::execute("insert into missing_table values (1)", vec![]),
            ])
            .await;
        assert!(result.is_err());
        assert!(db.query("select * from ar_pg_tx", &[]).await?.is_empty());

        db.execute("drop table ar_pg_tx", &[]).await?;
        Ok(())
    }
}
