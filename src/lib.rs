//! # Rust Active Record
//!
//! A small async active-record mapper. A [`RecordClass`] binds a table name,
//! primary key, field write policy and per-field codecs to a database
//! adapter; [`Record`]s are rows of it with change tracking.
//!
//! ## Features
//!
//! - **Pluggable drivers**: one object-safe [`Database`] trait, chosen at
//!   configuration time by backend name
//! - **Safe arguments**: every value is bound positionally with `?`
//!   placeholders, never interpolated into SQL
//! - **Write policy**: allow and deny lists filter fields on insert and update
//! - **Codecs**: per-field encode/decode, including a JSON codec
//! - **Async Support**: async/await on Tokio; blocking drivers run on the
//!   blocking pool under a per-operation timeout
//!
//! ## Supported Databases
//!
//! | Backend name | Adapter | Cargo feature |
//! |--------------|---------|---------------|
//! | `sqlite`, `sqlite3` | [`backends::SqliteDatabase`] (one inline connection) | `sqlite` (default) |
//! | `sqlite-pool` | `backends::PooledSqliteDatabase` | `sqlite` |
//! | `postgres`, `postgresql`, `psycopg2` | `backends::PostgresDatabase` | `postgres` |
//! | `mysql`, `mariadb`, `mysqldb` | `backends::MysqlDatabase` | `mysql` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_active_record::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let db = rust_active_record::backends::connect("sqlite3", ":memory:").await?;
//!     db.execute(
//!         "create table asd (id integer primary key autoincrement, age int, name text)",
//!         &[],
//!     )
//!     .await?;
//!
//!     let asd = RecordClass::builder("asd", db).build();
//!
//!     let mut rec = asd.new_record(fields! { "name" => "foo", "age" => 10 });
//!     let id = rec.save().await?;
//!     println!("saved {} as {}", rec, id);
//!
//!     asd.update(
//!         fields! { "age" => 20 },
//!         Some(Where::new("name=?", ["foo"])),
//!     )
//!     .await?;
//!
//!     for row in asd.all().await? {
//!         println!("{}", row);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! |-- core/              # Driver trait, values, SQL builders, config
//! |   |-- codec.rs
//! |   |-- config.rs
//! |   |-- database.rs
//! |   |-- database_types.rs
//! |   |-- error.rs
//! |   |-- query_builder.rs
//! |   `-- value.rs
//! |-- backends/          # sqlite, pooled sqlite, postgres, mysql
//! |-- model/             # RecordClass and Record
//! `-- lib.rs
//! ```

/// Core types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Record classes and records
pub mod model;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_active_record::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let db = rust_active_record::backends::connect("sqlite", ":memory:").await?;
///     assert!(db.is_connected());
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::core::{
        Codec, ConnectionBuilder, Database, DatabaseError, DatabaseResult, DatabaseRow,
        DatabaseType, DatabaseValue, DriverConfig, OrderDirection, Result, SelectOptions,
        Statement, Where,
    };
    pub use crate::fields;
    pub use crate::model::{Record, RecordClass, Selection};

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDatabase;
}

// Re-export at root level for convenience
pub use crate::core::{
    Codec, ConnectionBuilder, Database, DatabaseError, DatabaseResult, DatabaseRow, DatabaseType,
    DatabaseValue, DriverConfig, Result, SelectOptions, Statement, Where,
};
pub use crate::model::{Record, RecordClass, Selection};

#[cfg(feature = "sqlite")]
pub use crate::backends::SqliteDatabase;
