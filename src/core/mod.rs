//! Core types and traits
//!
//! This module provides the building blocks the record layer is written
//! against: error types, the driver trait, value types, SQL builders, codecs
//! and connection configuration.

pub mod codec;
pub mod config;
pub mod database;
pub mod database_types;
pub mod error;
pub mod query_builder;
pub mod value;

// Re-export commonly used types
pub use codec::Codec;
pub use config::{DriverConfig, PoolConfig, DEFAULT_OPERATION_TIMEOUT};
pub use database::{ConnectionBuilder, Database, Statement, StatementKind};
pub use database_types::DatabaseType;
pub use error::{DatabaseError, Result};
pub use query_builder::{
    numbered_placeholders, DeleteBuilder, InsertBuilder, OrderDirection, SelectBuilder,
    SelectOptions, UpdateBuilder, Where,
};
pub use value::{DatabaseResult, DatabaseRow, DatabaseValue};
