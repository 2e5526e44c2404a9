//! Record classes: one table, one write policy, one driver
//!
//! A [`RecordClass`] is declared once and then shared behind an `Arc` by every
//! [`Record`] it produces. All class-level CRUD operations live here; they
//! render SQL with the builders from [`crate::core::query_builder`] and hand it
//! to the class's [`Database`].

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::core::{
    Codec, Database, DatabaseError, DatabaseRow, DatabaseValue, DeleteBuilder, InsertBuilder,
    Result, SelectBuilder, SelectOptions, UpdateBuilder, Where,
};

use super::record::{Fields, Record};

/// Column used as primary key unless the class says otherwise
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Result of [`RecordClass::select`]
///
/// `limit(1)` selects a single optional record; every other query yields a
/// list.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Produced by `limit(1)`
    Single(Option<Record>),
    /// Produced by every other query
    Many(Vec<Record>),
}

impl Selection {
    /// Flatten into a list regardless of shape
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Selection::Single(record) => record.into_iter().collect(),
            Selection::Many(records) => records,
        }
    }

    /// First record, if any
    pub fn into_first(self) -> Option<Record> {
        match self {
            Selection::Single(record) => record,
            Selection::Many(records) => records.into_iter().next(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Selection::Single(record) => usize::from(record.is_some()),
            Selection::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for [`RecordClass`]
pub struct RecordClassBuilder {
    table: String,
    primary_key: String,
    allow: HashSet<String>,
    deny: HashSet<String>,
    codecs: HashMap<String, Codec>,
    db: Arc<dyn Database>,
}

impl RecordClassBuilder {
    /// Use a primary key column other than `id`
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Only these fields are written (the primary key is always allowed)
    #[must_use]
    pub fn allow<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(fields.into_iter().map(Into::into));
        self
    }

    /// These fields are never written; checked after `allow`
    #[must_use]
    pub fn deny<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Attach a codec to a field
    #[must_use]
    pub fn codec(mut self, field: impl Into<String>, codec: Codec) -> Self {
        self.codecs.insert(field.into(), codec);
        self
    }

    pub fn build(self) -> Arc<RecordClass> {
        Arc::new(RecordClass {
            table: self.table,
            primary_key: self.primary_key,
            allow: self.allow,
            deny: self.deny,
            codecs: self.codecs,
            db: self.db,
        })
    }
}

/// Immutable description of a table-backed record type
pub struct RecordClass {
    table: String,
    primary_key: String,
    allow: HashSet<String>,
    deny: HashSet<String>,
    codecs: HashMap<String, Codec>,
    db: Arc<dyn Database>,
}

impl RecordClass {
    /// Start declaring a class for `table`, bound to `db`
    ///
    /// ```no_run
    /// use rust_active_record::prelude::*;
    /// # async fn example() -> Result<()> {
    /// let db = rust_active_record::backends::connect("sqlite3", ":memory:").await?;
    /// let users = RecordClass::builder("users", db)
    ///     .deny(["password_confirmation"])
    ///     .codec("profile", Codec::json())
    ///     .build();
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(table: impl Into<String>, db: Arc<dyn Database>) -> RecordClassBuilder {
        RecordClassBuilder {
            table: table.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            allow: HashSet::new(),
            deny: HashSet::new(),
            codecs: HashMap::new(),
            db,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// The driver this class writes through
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Whether `field` passes the allow/deny policy
    pub fn is_writable(&self, field: &str) -> bool {
        if self.deny.contains(field) {
            return false;
        }
        field == self.primary_key || self.allow.is_empty() || self.allow.contains(field)
    }

    /// A fresh, unsaved record of this class
    pub fn new_record<I, K, V>(self: &Arc<Self>, fields: I) -> Record
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        Record::new(Arc::clone(self), collect_fields(fields))
    }

    /// Insert one row and return it as a persisted record
    ///
    /// Fields rejected by the allow/deny policy are dropped. When no primary
    /// key is supplied the insert and the key lookup run in one transaction
    /// and the generated key is attached to the returned record.
    pub async fn insert<I, K, V>(self: &Arc<Self>, fields: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        let mut fields = self.writable(collect_fields(fields));
        if fields.get(&self.primary_key).is_some_and(DatabaseValue::is_null) {
            fields.shift_remove(&self.primary_key);
        }

        let mut builder = InsertBuilder::new(&self.table);
        for (name, value) in &fields {
            builder = builder.value(name, self.encode(name, value)?);
        }
        let statement = if fields.is_empty() {
            self.db.empty_insert(&self.table)
        } else {
            builder.statement()
        };

        if fields.contains_key(&self.primary_key) {
            self.db.execute(&statement.sql, &statement.params).await?;
        } else {
            let lookup = self.db.last_inserted_key(&self.table, &self.primary_key);
            let results = self.db.run_in_transaction(vec![statement, lookup]).await?;
            let key = results
                .last()
                .and_then(|rows| rows.first())
                .and_then(|row| row.get("id").or_else(|| row.values().next()))
                .cloned()
                .filter(|key| !key.is_null())
                .ok_or_else(|| {
                    DatabaseError::query(format!(
                        "insert into {} did not report a generated key",
                        self.table
                    ))
                })?;
            fields.insert(self.primary_key.clone(), key);
        }

        tracing::debug!(table = %self.table, "record inserted");
        Ok(Record::persisted(Arc::clone(self), fields))
    }

    /// Update matching rows, returning the number of rows changed
    ///
    /// Without a `filter` every row in the table is updated.
    pub async fn update<I, K, V>(&self, fields: I, filter: Option<Where>) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        let fields = self.writable(collect_fields(fields));

        let mut builder = UpdateBuilder::new(&self.table);
        for (name, value) in &fields {
            builder = builder.set(name, self.encode(name, value)?);
        }
        if builder.is_empty() {
            return Err(DatabaseError::validation(format!(
                "no writable fields to update on {}",
                self.table
            )));
        }

        let statement = builder.filter(filter).statement();
        self.db.execute(&statement.sql, &statement.params).await
    }

    /// Select rows as records
    pub async fn select(self: &Arc<Self>, options: SelectOptions) -> Result<Selection> {
        let single = options.is_single();
        let statement = SelectBuilder::new(&self.table)
            .columns(self.db.select_columns(&self.primary_key))
            .options(options)
            .statement();

        let rows = self.db.query(&statement.sql, &statement.params).await?;
        let mut records = rows
            .into_iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>>>()?;

        if single {
            Ok(Selection::Single(if records.is_empty() {
                None
            } else {
                Some(records.swap_remove(0))
            }))
        } else {
            Ok(Selection::Many(records))
        }
    }

    /// Same as [`select`](Self::select)
    pub async fn find(self: &Arc<Self>, options: SelectOptions) -> Result<Selection> {
        self.select(options).await
    }

    /// Every row of the table
    pub async fn all(self: &Arc<Self>) -> Result<Vec<Record>> {
        Ok(self.select(SelectOptions::new()).await?.into_records())
    }

    /// First matching record, or `None` when nothing matches
    pub async fn find_first(self: &Arc<Self>, options: SelectOptions) -> Result<Option<Record>> {
        Ok(self.select(options.limit(1)).await?.into_first())
    }

    /// Look a record up by primary key
    pub async fn find_by_key(
        self: &Arc<Self>,
        key: impl Into<DatabaseValue>,
    ) -> Result<Option<Record>> {
        let filter = Where::new(format!("{}=?", self.primary_key), [key.into()]);
        self.find_first(SelectOptions::new().filter(filter)).await
    }

    /// Number of matching rows
    pub async fn count(&self, filter: Option<Where>) -> Result<i64> {
        let mut options = SelectOptions::new();
        if let Some(filter) = filter {
            options = options.filter(filter);
        }
        let statement = SelectBuilder::new(&self.table)
            .columns("count(*) as count")
            .options(options)
            .statement();

        let rows = self.db.query(&statement.sql, &statement.params).await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(DatabaseValue::as_int)
            .ok_or_else(|| DatabaseError::ColumnNotFound("count".to_string()))
    }

    /// Delete matching rows, or every row without a filter
    pub async fn delete(&self, filter: Option<Where>) -> Result<u64> {
        let statement = DeleteBuilder::new(&self.table).filter(filter).statement();
        self.db.execute(&statement.sql, &statement.params).await
    }

    fn writable(&self, fields: Fields) -> Fields {
        fields
            .into_iter()
            .filter(|(name, _)| self.is_writable(name))
            .collect()
    }

    fn encode(&self, field: &str, value: &DatabaseValue) -> Result<DatabaseValue> {
        match self.codecs.get(field) {
            Some(codec) => codec.encode(field, value),
            None => Ok(value.clone()),
        }
    }

    fn decode_row(self: &Arc<Self>, row: DatabaseRow) -> Result<Record> {
        let mut fields = Fields::with_capacity(row.len());
        for (name, value) in row {
            let value = match self.codecs.get(&name) {
                Some(codec) => codec.decode(&name, &value)?,
                None => value,
            };
            fields.insert(name, value);
        }
        Ok(Record::persisted(Arc::clone(self), fields))
    }
}

impl fmt::Debug for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordClass")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("allow", &self.allow)
            .field("deny", &self.deny)
            .field("codecs", &self.codecs.keys().collect::<Vec<_>>())
            .field("database", &self.db.database_type())
            .finish()
    }
}

fn collect_fields<I, K, V>(fields: I) -> Fields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<DatabaseValue>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect::<IndexMap<_, _>>()
}
