//! Driver identifiers
//!
//! This module defines the backends a record class can be bound to and how
//! their configuration-time names are parsed.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DatabaseError;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseType {
    /// Embedded SQLite, one inline connection
    Sqlite,
    /// Embedded SQLite behind a connection pool
    PooledSqlite,
    /// PostgreSQL
    Postgres,
    /// MySQL/MariaDB
    Mysql,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::PooledSqlite => "sqlite-pool",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mysql => "mysql",
        }
    }

    /// Name of the cargo feature that compiles this backend in
    pub fn feature(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite | DatabaseType::PooledSqlite => "sqlite",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mysql => "mysql",
        }
    }

    /// Check whether this backend was compiled in
    pub fn is_available(&self) -> bool {
        match self {
            DatabaseType::Sqlite | DatabaseType::PooledSqlite => cfg!(feature = "sqlite"),
            DatabaseType::Postgres => cfg!(feature = "postgres"),
            DatabaseType::Mysql => cfg!(feature = "mysql"),
        }
    }

    /// Check if the backend spreads work across several connections
    pub fn is_pooled(&self) -> bool {
        !matches!(self, DatabaseType::Sqlite)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "sqlite-pool" | "pooled-sqlite" | "sqlite_pool" => Ok(DatabaseType::PooledSqlite),
            "postgres" | "postgresql" | "psycopg2" => Ok(DatabaseType::Postgres),
            "mysql" | "mariadb" | "mysqldb" => Ok(DatabaseType::Mysql),
            _ => Err(DatabaseError::configuration(format!(
                "Database '{}' is not yet supported",
                s
            ))),
        }
    }
}
