//! Error types for the record mapper
//!
//! Errors fall into three families: configuration errors raised while a
//! driver is being selected, validation errors raised by records before any
//! I/O happens, and driver errors surfaced by the database backends.

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Unknown or unavailable driver, or an invalid driver configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A record operation was rejected before reaching the database
    #[error("Validation error: {0}")]
    Validation(String),

    /// A field codec failed to encode or decode a value
    #[error("Codec error on field '{field}': {message}")]
    Codec { field: String, message: String },

    /// Connection error (generic)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query timeout
    #[error("Query timeout after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Column not found in a result row
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    /// MySQL error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MysqlError(#[from] mysql_async::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Configuration(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Validation(msg.into())
    }

    /// Create a codec error for the given field
    pub fn codec(field: impl Into<String>, message: impl Into<String>) -> Self {
        DatabaseError::Codec {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a query timeout error
    pub fn query_timeout(timeout_ms: u64) -> Self {
        DatabaseError::QueryTimeout { timeout_ms }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// True for configuration errors
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, DatabaseError::Configuration(_))
    }

    /// True for validation errors
    pub fn is_validation_error(&self) -> bool {
        matches!(self, DatabaseError::Validation(_))
    }

    /// True for anything the backend surfaced: connectivity, SQL, constraint,
    /// timeout and transaction failures
    pub fn is_driver_error(&self) -> bool {
        match self {
            DatabaseError::ConnectionError(_)
            | DatabaseError::QueryError(_)
            | DatabaseError::QueryTimeout { .. }
            | DatabaseError::TransactionError(_) => true,
            #[cfg(feature = "sqlite")]
            DatabaseError::SqliteError(_) => true,
            #[cfg(feature = "postgres")]
            DatabaseError::PostgresError(_) => true,
            #[cfg(feature = "mysql")]
            DatabaseError::MysqlError(_) => true,
            _ => false,
        }
    }
}
