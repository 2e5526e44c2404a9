//! In-memory rows with change tracking

use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::sync::Arc;

use crate::core::{DatabaseError, DatabaseValue, Result, Where};

use super::record_class::RecordClass;

/// Field name to value, in insertion (or column) order
pub type Fields = IndexMap<String, DatabaseValue>;

static NULL: DatabaseValue = DatabaseValue::Null;

/// One row of a record class
///
/// Bookkeeping (dirty set, stored key, owning class) lives in struct
/// fields, so any string is a valid field name.
#[derive(Clone)]
pub struct Record {
    class: Arc<RecordClass>,
    fields: Fields,
    dirty: IndexSet<String>,
    /// Key of the row this record mirrors; `None` until saved
    stored_key: Option<DatabaseValue>,
}

impl Record {
    /// An unsaved record
    pub(crate) fn new(class: Arc<RecordClass>, fields: Fields) -> Self {
        Self {
            class,
            fields,
            dirty: IndexSet::new(),
            stored_key: None,
        }
    }

    /// A record that mirrors a stored row
    pub(crate) fn persisted(class: Arc<RecordClass>, fields: Fields) -> Self {
        let stored_key = fields
            .get(class.primary_key())
            .filter(|key| !key.is_null())
            .cloned();
        Self {
            class,
            fields,
            dirty: IndexSet::new(),
            stored_key,
        }
    }

    /// The class this record belongs to
    pub fn class(&self) -> &Arc<RecordClass> {
        &self.class
    }

    /// Field value, or `Null` when the field is absent
    pub fn get(&self, field: &str) -> &DatabaseValue {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Field value, distinguishing absent from null
    pub fn try_get(&self, field: &str) -> Option<&DatabaseValue> {
        self.fields.get(field)
    }

    /// Assign a field and mark it changed
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<DatabaseValue>) {
        let field = field.into();
        self.dirty.insert(field.clone());
        self.fields.insert(field, value.into());
    }

    /// Primary key value, if one has been assigned
    pub fn id(&self) -> Option<&DatabaseValue> {
        self.fields
            .get(self.class.primary_key())
            .filter(|key| !key.is_null())
    }

    pub fn is_persisted(&self) -> bool {
        self.stored_key.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Fields changed since the last save or load
    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Insert if unsaved, otherwise update the changed fields
    ///
    /// Returns the primary key. The update targets the row the record was
    /// loaded or saved as, so assigning a new primary key moves that row.
    ///
    /// # Errors
    ///
    /// A persisted record with no changes is rejected with a validation error
    /// before anything is sent to the database, as is a key change to null or
    /// to a key the class is not allowed to write.
    pub async fn save(&mut self) -> Result<DatabaseValue> {
        self.save_fields(false).await
    }

    /// Like [`save`](Self::save), but a persisted record writes every field
    /// whether or not it changed
    pub async fn force_save(&mut self) -> Result<DatabaseValue> {
        self.save_fields(true).await
    }

    async fn save_fields(&mut self, force: bool) -> Result<DatabaseValue> {
        let primary_key = self.class.primary_key().to_string();

        let Some(stored_key) = self.stored_key.clone() else {
            let saved = self.class.insert(self.fields.clone()).await?;
            let key = saved
                .id()
                .cloned()
                .ok_or_else(|| DatabaseError::query("insert returned no primary key"))?;
            self.fields.insert(primary_key, key.clone());
            self.stored_key = Some(key.clone());
            self.dirty.clear();
            return Ok(key);
        };

        if !force && self.dirty.is_empty() {
            return Err(DatabaseError::validation("no changes to commit"));
        }

        let key = self
            .id()
            .cloned()
            .ok_or_else(|| DatabaseError::validation("primary key cannot be cleared"))?;
        let key_changed = key != stored_key;
        if key_changed && !self.class.is_writable(&primary_key) {
            return Err(DatabaseError::validation(format!(
                "primary key {} is not writable",
                primary_key
            )));
        }

        let changes: Vec<(String, DatabaseValue)> = if force {
            self.fields
                .iter()
                .filter(|(name, _)| key_changed || **name != primary_key)
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        } else {
            self.dirty
                .iter()
                .filter(|name| key_changed || **name != primary_key)
                .map(|name| (name.clone(), self.get(name).clone()))
                .collect()
        };

        if !changes.is_empty() {
            let filter = Where::new(format!("{}=?", primary_key), [stored_key]);
            self.class.update(changes, Some(filter)).await?;
        }
        self.stored_key = Some(key.clone());
        self.dirty.clear();
        Ok(key)
    }

    /// Delete this record's row and detach it
    ///
    /// Returns the primary key that was removed from the fields.
    ///
    /// # Errors
    ///
    /// An unsaved record is rejected with a validation error.
    pub async fn delete(&mut self) -> Result<DatabaseValue> {
        let Some(key) = self.stored_key.clone() else {
            return Err(DatabaseError::validation("record has not been saved"));
        };
        let primary_key = self.class.primary_key().to_string();

        self.class
            .delete(Some(Where::new(format!("{}=?", primary_key), [key.clone()])))
            .await?;

        self.dirty.clear();
        self.stored_key = None;
        self.fields.shift_remove(&primary_key);
        Ok(key)
    }
}

/// A record used as a value stands for its primary key
impl From<&Record> for DatabaseValue {
    fn from(record: &Record) -> Self {
        record.id().cloned().unwrap_or(DatabaseValue::Null)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.class.table())
            .field("fields", &self.fields)
            .field("dirty", &self.dirty)
            .field("stored_key", &self.stored_key)
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.class.table())?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        f.write_str("}")
    }
}
