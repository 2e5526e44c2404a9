//! SQL text builders for the CRUD layer
//!
//! Each builder renders one statement with `?` placeholders and collects the
//! bound values in placeholder order. Where clauses, orderings and groupings
//! are raw SQL fragments supplied by the caller; only values travel as
//! parameters.

use super::database::Statement;
use super::value::DatabaseValue;

/// A raw `where` fragment and the values bound to its placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    fragment: String,
    params: Vec<DatabaseValue>,
}

impl Where {
    /// Create a where clause from a fragment and its arguments
    ///
    /// ```
    /// use rust_active_record::core::{DatabaseValue, Where};
    ///
    /// let filter = Where::new("name=? and age>?", [DatabaseValue::from("foo"), 18.into()]);
    /// assert_eq!(filter.fragment(), "name=? and age>?");
    /// assert_eq!(filter.params().len(), 2);
    /// ```
    pub fn new<I, V>(fragment: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        Self {
            fragment: fragment.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// A where clause without arguments
    pub fn raw(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            params: Vec::new(),
        }
    }

    /// Bind one more argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<DatabaseValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn params(&self) -> &[DatabaseValue] {
        &self.params
    }
}

/// ORDER BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order
    Asc,
    /// Descending order
    Desc,
}

impl OrderDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

/// Options accepted by `select` and its wrappers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectOptions {
    pub(crate) filter: Option<Where>,
    pub(crate) group_by: Option<String>,
    pub(crate) order_by: Option<String>,
    pub(crate) direction: Option<OrderDirection>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict rows with a where fragment
    #[must_use]
    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Shorthand for `filter(Where::new(fragment, params))`
    #[must_use]
    pub fn where_<I, V>(self, fragment: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        self.filter(Where::new(fragment, params))
    }

    /// Add a GROUP BY fragment
    #[must_use]
    pub fn group_by(mut self, fragment: impl Into<String>) -> Self {
        self.group_by = Some(fragment.into());
        self
    }

    /// Add an ORDER BY fragment
    #[must_use]
    pub fn order_by(mut self, fragment: impl Into<String>) -> Self {
        self.order_by = Some(fragment.into());
        self
    }

    /// Append `asc` after the ordering
    #[must_use]
    pub fn asc(mut self) -> Self {
        self.direction = Some(OrderDirection::Asc);
        self
    }

    /// Append `desc` after the ordering
    #[must_use]
    pub fn desc(mut self) -> Self {
        self.direction = Some(OrderDirection::Desc);
        self
    }

    /// Add LIMIT clause
    ///
    /// `limit(1)` makes `select` return a single optional record.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add OFFSET clause
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// True when `select` should hand back one record instead of a list
    pub fn is_single(&self) -> bool {
        self.limit == Some(1)
    }
}

/// Row limit rendered when only an offset was requested
const UNBOUNDED_LIMIT: i64 = i64::MAX;

/// SELECT statement builder
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    columns: String,
    options: SelectOptions,
}

impl SelectBuilder {
    /// Create a new SELECT builder over all columns
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            options: SelectOptions::default(),
        }
    }

    /// Replace the column list
    #[must_use]
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Apply select options
    #[must_use]
    pub fn options(mut self, options: SelectOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let mut sql = format!("select {} from {}", self.columns, self.table);

        if let Some(filter) = &self.options.filter {
            sql.push_str(&format!(" where {}", filter.fragment()));
        }
        if let Some(group_by) = &self.options.group_by {
            sql.push_str(&format!(" group by {}", group_by));
        }
        if let Some(order_by) = &self.options.order_by {
            sql.push_str(&format!(" order by {}", order_by));
        }
        if let Some(direction) = self.options.direction {
            sql.push(' ');
            sql.push_str(direction.as_sql());
        }
        match (self.options.limit, self.options.offset) {
            (Some(limit), _) => sql.push_str(&format!(" limit {}", limit)),
            // SQLite and MySQL only accept OFFSET after a LIMIT
            (None, Some(_)) => sql.push_str(&format!(" limit {}", UNBOUNDED_LIMIT)),
            (None, None) => {}
        }
        if let Some(offset) = self.options.offset {
            sql.push_str(&format!(" offset {}", offset));
        }

        sql
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<DatabaseValue> {
        self.options
            .filter
            .as_ref()
            .map(|f| f.params().to_vec())
            .unwrap_or_default()
    }

    pub fn statement(&self) -> Statement {
        Statement::query(self.build(), self.params())
    }
}

/// INSERT statement builder
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl InsertBuilder {
    /// Create a new INSERT builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Add a column-value pair
    #[must_use]
    pub fn value(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.columns.push(column.to_string());
        self.values.push(value.into());
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        if self.columns.is_empty() {
            return format!("insert into {} default values", self.table);
        }
        let placeholders = vec!["?"; self.values.len()];
        format!(
            "insert into {} ({}) values ({})",
            self.table,
            self.columns.join(","),
            placeholders.join(",")
        )
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<DatabaseValue> {
        self.values.clone()
    }

    pub fn statement(&self) -> Statement {
        Statement::execute(self.build(), self.params())
    }
}

/// UPDATE statement builder
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set_columns: Vec<String>,
    set_values: Vec<DatabaseValue>,
    filter: Option<Where>,
}

impl UpdateBuilder {
    /// Create a new UPDATE builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set_columns: Vec::new(),
            set_values: Vec::new(),
            filter: None,
        }
    }

    /// Set a column value
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.set_columns.push(column.to_string());
        self.set_values.push(value.into());
        self
    }

    /// Restrict the rows touched; without it every row is updated
    #[must_use]
    pub fn filter(mut self, filter: Option<Where>) -> Self {
        self.filter = filter;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set_columns.is_empty()
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let set_clauses: Vec<String> = self
            .set_columns
            .iter()
            .map(|col| format!("{}=?", col))
            .collect();

        let mut sql = format!("update {} set {}", self.table, set_clauses.join(","));
        if let Some(filter) = &self.filter {
            sql.push_str(&format!(" where {}", filter.fragment()));
        }
        sql
    }

    /// Get the parameter values (SET values followed by WHERE values)
    pub fn params(&self) -> Vec<DatabaseValue> {
        let mut params = self.set_values.clone();
        if let Some(filter) = &self.filter {
            params.extend(filter.params().iter().cloned());
        }
        params
    }

    pub fn statement(&self) -> Statement {
        Statement::execute(self.build(), self.params())
    }
}

/// DELETE statement builder
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    filter: Option<Where>,
}

impl DeleteBuilder {
    /// Create a new DELETE builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    /// Restrict the rows removed; without it the table is emptied
    #[must_use]
    pub fn filter(mut self, filter: Option<Where>) -> Self {
        self.filter = filter;
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        match &self.filter {
            Some(filter) => format!("delete from {} where {}", self.table, filter.fragment()),
            None => format!("delete from {}", self.table),
        }
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<DatabaseValue> {
        self.filter
            .as_ref()
            .map(|f| f.params().to_vec())
            .unwrap_or_default()
    }

    pub fn statement(&self) -> Statement {
        Statement::execute(self.build(), self.params())
    }
}

/// Rewrite `?` markers as `$1, $2, ...`
///
/// Markers inside single- or double-quoted text are left alone.
pub fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            },
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_basic() {
        let query = SelectBuilder::new("users").build();
        assert_eq!(query, "select * from users");
    }

    #[test]
    fn test_select_all_options() {
        let builder = SelectBuilder::new("users").columns("id, *").options(
            SelectOptions::new()
                .where_("name=? and age>?", vec!["foo".into(), DatabaseValue::from(18)])
                .group_by("age")
                .order_by("name")
                .desc()
                .limit(10)
                .offset(20),
        );

        assert_eq!(
            builder.build(),
            "select id, * from users where name=? and age>? group by age order by name desc limit 10 offset 20"
        );
        assert_eq!(builder.params().len(), 2);
    }

    #[test]
    fn test_select_offset_without_limit() {
        let builder = SelectBuilder::new("asd").options(SelectOptions::new().offset(1));
        assert_eq!(
            builder.build(),
            "select * from asd limit 9223372036854775807 offset 1"
        );
    }

    #[test]
    fn test_insert() {
        let builder = InsertBuilder::new("asd").value("name", "foo").value("age", 10);

        assert_eq!(builder.build(), "insert into asd (name,age) values (?,?)");
        assert_eq!(
            builder.params(),
            vec![DatabaseValue::from("foo"), DatabaseValue::from(10)]
        );
    }

    #[test]
    fn test_insert_without_columns() {
        assert_eq!(
            InsertBuilder::new("asd").build(),
            "insert into asd default values"
        );
    }

    #[test]
    fn test_update_params_follow_placeholders() {
        let builder = UpdateBuilder::new("asd")
            .set("age", 20)
            .set("name", "bar")
            .filter(Some(Where::new("name=?", ["foo"])));

        assert_eq!(builder.build(), "update asd set age=?,name=? where name=?");
        assert_eq!(
            builder.params(),
            vec![
                DatabaseValue::from(20),
                DatabaseValue::from("bar"),
                DatabaseValue::from("foo")
            ]
        );
    }

    #[test]
    fn test_update_without_filter_touches_every_row() {
        let builder = UpdateBuilder::new("asd").set("age", 1);
        assert_eq!(builder.build(), "update asd set age=?");
    }

    #[test]
    fn test_delete() {
        let builder = DeleteBuilder::new("asd").filter(Some(Where::new("id=?", [42])));
        assert_eq!(builder.build(), "delete from asd where id=?");
        assert_eq!(builder.params().len(), 1);

        assert_eq!(DeleteBuilder::new("asd").build(), "delete from asd");
    }

    #[test]
    fn test_numbered_placeholders() {
        assert_eq!(
            numbered_placeholders("update t set a=?,b=? where c=?"),
            "update t set a=$1,b=$2 where c=$3"
        );
        assert_eq!(
            numbered_placeholders("select * from t where a='?' and b=?"),
            "select * from t where a='?' and b=$1"
        );
    }

    #[test]
    fn test_where_arg_builder() {
        let filter = Where::raw("a=? and b=?").arg(1).arg("x");
        assert_eq!(filter.params().len(), 2);
    }
}
